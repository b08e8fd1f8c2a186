fn main() {
    // If CORETEX_CLI_VERSION is set during the build (e.g., in CI),
    // pass it to the rustc compiler.
    if let Ok(version) = std::env::var("CORETEX_CLI_VERSION") {
        println!("cargo:rustc-env=CORETEX_CLI_VERSION={version}");
    }
}
