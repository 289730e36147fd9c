fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Central proto repo is at ../../proto/ relative to test-plugins/greeter/
    let proto_root = "../../proto";
    let greeter_proto = format!("{proto_root}/tether/greeter/v1/greeter.proto");

    println!("cargo:rerun-if-changed={greeter_proto}");

    // SAFETY: build scripts are single-threaded at this point.
    unsafe {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // Payload is shared with tether-core so registry-encoded values need no
    // conversion at the RPC boundary.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .extern_path(".tether.payload.v1", "::tether_core::proto")
        .compile_protos(&[&greeter_proto], &[proto_root])?;

    Ok(())
}
