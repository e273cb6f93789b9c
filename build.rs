fn main() {
    println!("cargo:rerun-if-env-changed=RTDB_LIB_DIR");

    if std::env::var_os("CARGO_FEATURE_FFI").is_none() {
        return;
    }
    if let Ok(dir) = std::env::var("RTDB_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }
}
