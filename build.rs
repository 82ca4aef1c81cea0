fn main() {
    // Stamp the build timestamp for the version banner
    let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string();
    println!("cargo:rustc-env=BUILD_DATE={stamp}");
}
