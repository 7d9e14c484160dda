//! Build script for proto compilation.
//!
//! Compiles `proto/provider.proto` into the `twingate.provider.v1` module
//! that `src/generated.rs` includes. Requires `protoc` on the `PATH`.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_client(false)
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/provider.proto");

    Ok(())
}
