fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Central proto repo is at ../proto/ relative to core/
    let proto_root = "../proto";
    let payload_proto = format!("{proto_root}/tether/payload/v1/payload.proto");

    println!("cargo:rerun-if-changed={payload_proto}");

    // Use the vendored protoc so builds don't depend on a system install.
    // SAFETY: build scripts are single-threaded at this point.
    unsafe {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // Payload is a plain message, no services to generate.
    tonic_build::configure()
        .build_server(false)
        .build_client(false)
        .compile_protos(&[&payload_proto], &[proto_root])?;

    Ok(())
}
