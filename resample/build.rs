fn main() {
    if std::env::var_os("CARGO_FEATURE_SOXR").is_none() {
        return;
    }
    println!("cargo:rustc-link-search=native=/opt/homebrew/lib");
    println!("cargo:rustc-link-search=native=/usr/local/lib");
    println!("cargo:rustc-link-lib=soxr");
}
