fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Ensure a protoc binary is available even when one is not installed
    // system-wide, by pointing at the vendored copy.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            // SAFETY: single-threaded build script, before any threads spawn.
            unsafe { std::env::set_var("PROTOC", protoc) };
        }
    }

    // Compile protobuf definitions
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/bdev.proto", "proto/control.proto"],
            &["proto"],
        )?;

    Ok(())
}
