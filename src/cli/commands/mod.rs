use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Pure clap command definitions with zero business logic
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("dsn")
                .env("CLUSTER_SETTINGS_DSN")
                .help("postgresql://<username>:<password>@<host>:<port>/<database>")
                .long("dsn")
                .short('d')
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("listen")
                .env("CLUSTER_SETTINGS_LISTEN")
                .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                .long("listen")
                .long_help(
                    "IP address to bind to:\n\
                    Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                    Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                    Usage examples:\n\
                    - `--listen 0.0.0.0` binds IPv4 only\n\
                    - `--listen 127.0.0.1` serves local clients only",
                )
                .short('l')
                .value_name("IP"),
        )
        .arg(
            Arg::new("port")
                .default_value("3002")
                .env("CLUSTER_SETTINGS_PORT")
                .help("listening port for the settings report")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("max-connections")
                .default_value("10")
                .env("CLUSTER_SETTINGS_MAX_CONNECTIONS")
                .help("maximum number of simultaneous database connections")
                .long("max-connections")
                .value_name("N")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("idle-timeout-ms")
                .default_value("15000")
                .env("CLUSTER_SETTINGS_IDLE_TIMEOUT_MS")
                .help("milliseconds an unused connection stays open")
                .long("idle-timeout-ms")
                .value_name("MS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("acquire-timeout-ms")
                .default_value("5000")
                .env("CLUSTER_SETTINGS_ACQUIRE_TIMEOUT_MS")
                .help("milliseconds a request waits for a free connection, 0 waits forever")
                .long("acquire-timeout-ms")
                .value_name("MS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("tls-mode")
                .default_value("verify-full")
                .env("CLUSTER_SETTINGS_TLS_MODE")
                .help("TLS mode: require, verify-ca, verify-full")
                .long("tls-mode")
                .long_help(
                    "TLS connection mode, connections are always encrypted:\n\n\
                    - require: TLS required, no certificate verification (testing only)\n\
                    - verify-ca: Verify server certificate against CA\n\
                    - verify-full: Verify certificate and hostname (default)",
                )
                .value_name("MODE")
                .value_parser(["require", "verify-ca", "verify-full"]),
        )
        .arg(
            Arg::new("tls-ca")
                .env("CLUSTER_SETTINGS_TLS_CA")
                .help("Path to CA certificate file for TLS verification")
                .long("tls-ca")
                .long_help(
                    "Path to Certificate Authority (CA) certificate file.\n\
                    Required for verify-ca and verify-full modes.\n\n\
                    Example: /cockroach-certs/ca.crt",
                )
                .value_name("PATH")
                .conflicts_with("tls-ca-pem"),
        )
        .arg(
            Arg::new("tls-ca-pem")
                .env("CLUSTER_SETTINGS_TLS_CA_PEM")
                .help("PEM encoded CA certificate, instead of --tls-ca")
                .long("tls-ca-pem")
                .allow_hyphen_values(true)
                .hide_env_values(true)
                .value_name("PEM"),
        )
        .arg(
            Arg::new("verbose")
                .help("Increase verbosity, -v for debug, -vv for trace")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
}
