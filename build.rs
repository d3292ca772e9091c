//! Build script for LLM Loader
//!
//! Embeds git revision, build time and target into the binary.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let hash = run("git", &["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(unknown);
    let dirty = run("git", &["status", "--porcelain"])
        .map(|out| (!out.is_empty()).to_string())
        .unwrap_or_else(|| "false".to_string());
    let rustc = run("rustc", &["--version"]).unwrap_or_else(unknown);
    let built = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let vars = [
        ("LLM_LOADER_GIT_HASH", hash),
        ("LLM_LOADER_GIT_DIRTY", dirty),
        ("LLM_LOADER_BUILD_TIMESTAMP", built),
        ("LLM_LOADER_TARGET", env::var("TARGET").unwrap_or_else(|_| unknown())),
        ("LLM_LOADER_PROFILE", env::var("PROFILE").unwrap_or_else(|_| unknown())),
        ("LLM_LOADER_RUSTC_VERSION", rustc),
    ];
    for (key, value) in vars {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

/// Trimmed stdout of a successful command
fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}

fn unknown() -> String {
    "unknown".to_string()
}
