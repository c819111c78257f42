use std::process::Command;

/// Commit shown in the startup banner. An explicit `GIT_SHA` wins so builds
/// from a source tarball can still be stamped.
fn commit_sha() -> Option<String> {
    if let Ok(sha) = std::env::var("GIT_SHA") {
        return Some(sha);
    }
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

fn main() {
    let sha = commit_sha().unwrap_or_else(|| "dev".to_owned());

    println!("cargo:rustc-env=GIT_SHA={sha}");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}
