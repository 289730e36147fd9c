fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Central proto repo is at ../proto/ relative to plugin/
    let proto_root = "../proto";
    let catalog_proto = format!("{proto_root}/tether/catalog/v1/catalog.proto");

    println!("cargo:rerun-if-changed={catalog_proto}");

    // SAFETY: build scripts are single-threaded at this point.
    unsafe {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // Plugins call Add as clients; the host side runs the server.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&[&catalog_proto], &[proto_root])?;

    Ok(())
}
