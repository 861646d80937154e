use std::env;
use std::path::PathBuf;

fn main() {
    let githeight_version = calculate_githeight_version();
    println!(
        "cargo:rustc-env=GITHEIGHT_CALCULATED_VERSION={}",
        githeight_version
    );

    // shadow-rs generates extended build metadata (git hash, timestamps, rustc version)
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("shadow-rs build failed");
}

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    manifest_dir
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn calculate_githeight_version() -> String {
    let work_dir = workspace_root();
    let request = githeight::VersionRequest::default();

    match githeight::get_version(&work_dir, &request) {
        Ok(oracle) if oracle.version_file_found => oracle.sem_ver2,
        _ => env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0-dev".to_string()),
    }
}
