// Build script for d3guardctl - embeds version at compile time

fn main() {
    // Packagers may pin the reported version; otherwise use Cargo.toml
    let version =
        std::env::var("D3GUARD_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=D3GUARD_VERSION={}", version);

    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=D3GUARD_VERSION");
}
