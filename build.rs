use std::process::Command;

/// Trimmed stdout of a git command, if git is available and it succeeds
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let commit = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let version = git(&["describe", "--tags", "--dirty"])
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    // Shown by `dialback --version`
    println!("cargo:rustc-env=DIALBACK_COMMIT={}", commit);
    println!("cargo:rustc-env=DIALBACK_VERSION={}", version);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");
}
