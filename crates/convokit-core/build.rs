use std::process::Command;

/// Short hash of `HEAD`, or `None` outside a git checkout.
fn head_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string())
}

fn main() {
    let git_hash = head_commit().unwrap_or_else(|| "unknown".to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=CONVOKIT_GIT_HASH={git_hash}");
    println!("cargo:rustc-env=CONVOKIT_BUILD_PROFILE={profile}");

    for watched in ["../../.git/HEAD", "../../.git/refs"] {
        println!("cargo:rerun-if-changed={watched}");
    }
}
