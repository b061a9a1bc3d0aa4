// ABOUTME: Build script for generating Rust code from orchestrator.proto.
// ABOUTME: Uses tonic-build to compile protobuf definitions into Rust types.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Servers are generated too so tests can stand up an in-process orchestrator
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto-src/orchestrator.proto"], &["proto-src"])?;

    println!("cargo:rerun-if-changed=proto-src/orchestrator.proto");

    Ok(())
}
