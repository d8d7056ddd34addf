//! Version and usage text.

/// The daemon version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version_line() -> String {
    format!("accessh-daemon {}", VERSION)
}

pub fn usage() -> String {
    format!(
        "{}\n\n\
         Usage: accessh-daemon [OPTIONS]\n\n\
         Options:\n  \
         -c, --config <FILE>  Configuration file [default: config.json]\n  \
         -V, --version        Print version\n  \
         -h, --help           Print help\n\n\
         Environment:\n  \
         ACCESSH_API_TOKEN    API token, overrides apiToken in the config file\n  \
         RUST_LOG             Log filter, overrides logLevel\n",
        version_line()
    )
}
