use std::env;
use std::process::Command;

// Run git, falling back to an env var for builds outside a checkout (e.g. Docker)
fn git(args: &[&str], fallback_var: &str) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| env::var(fallback_var).ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let git_hash = git(&["rev-parse", "--short", "HEAD"], "GIT_HASH");
    let git_date = git(&["log", "-1", "--format=%ci"], "GIT_DATE");
    let git_branch = git(&["rev-parse", "--abbrev-ref", "HEAD"], "GIT_BRANCH");

    let git_dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty())
        .or_else(|| env::var("GIT_DIRTY").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(false);

    let build_timestamp = chrono::Utc::now().to_rfc3339();

    let rust_version = rustc_version::version()
        .map(|v| v.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=GIT_DATE={}", git_date);
    println!("cargo:rustc-env=GIT_BRANCH={}", git_branch);
    println!("cargo:rustc-env=GIT_DIRTY={}", git_dirty);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=RUST_VERSION={}", rust_version);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
