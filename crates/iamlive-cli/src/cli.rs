//! CLI flag parsing (§6). Defaults are layered: hardcoded fallback, then
//! `~/.iamlive/config`, then an explicit flag on the command line —
//! matching the original's `parseConfig()` → `flag.String(..., fromIni,
//! ...)` → `flag.Parse()` sequence. Because clap's own `default_value`
//! can't express "read from a file at runtime", the `clap::Command` is
//! built with its argument defaults computed from the loaded INI map
//! before `get_matches` ever runs.

use std::collections::HashMap;

use clap::{Arg, ArgAction, Command};

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub provider: String,
    pub set_ini: bool,
    pub profile: String,
    pub fails_only: bool,
    pub output_file: Option<String>,
    pub refresh_rate: u64,
    pub sort_alphabetical: bool,
    pub host: String,
    pub mode: String,
    pub bind_addr: String,
    pub ca_bundle: String,
    pub ca_key: String,
    pub account_id: Option<String>,
    pub background: bool,
    pub override_aws_map: Option<String>,
    pub debug: bool,
    pub force_wildcard_resource: bool,
    pub csm_port: u16,
    pub aws_redirect_host: Option<String>,
    pub cpu_profile: Option<String>,
}

struct FlagDefaults<'a>(&'a HashMap<String, String>);

impl FlagDefaults<'_> {
    fn str(&self, name: &str, hardcoded: &str) -> String {
        self.0.get(name).cloned().unwrap_or_else(|| hardcoded.to_string())
    }

    fn opt(&self, name: &str) -> Option<String> {
        self.0.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn bool_str(&self, name: &str, hardcoded: bool) -> String {
        self.0
            .get(name)
            .cloned()
            .unwrap_or_else(|| hardcoded.to_string())
    }
}

fn bool_arg(name: &'static str, help: &'static str, default: String) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .num_args(0..=1)
        .default_value(default)
        .default_missing_value("true")
        .value_parser(clap::value_parser!(bool))
        .action(ArgAction::Set)
}

fn command(defaults: &HashMap<String, String>) -> Command {
    let d = FlagDefaults(defaults);

    Command::new("iamlive")
        .about("Generate an IAM policy from observed AWS/Azure/GCP API calls")
        .arg(Arg::new("provider").long("provider").default_value(d.str("provider", "aws")))
        .arg(bool_arg("set-ini", "edit the cloud CLI config to enable interception", d.bool_str("set-ini", false)))
        .arg(Arg::new("profile").long("profile").default_value(d.str("profile", "default")))
        .arg(bool_arg("fails-only", "only record calls that failed", d.bool_str("fails-only", false)))
        .arg(Arg::new("output-file").long("output-file").default_value(d.str("output-file", "")))
        .arg(
            Arg::new("refresh-rate")
                .long("refresh-rate")
                .default_value(d.str("refresh-rate", "0"))
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(bool_arg(
            "sort-alphabetical",
            "sort actions alphabetically in the output",
            d.bool_str("sort-alphabetical", false),
        ))
        .arg(Arg::new("host").long("host").default_value(d.str("host", "127.0.0.1")))
        .arg(Arg::new("mode").long("mode").default_value(d.str("mode", "csm")))
        .arg(Arg::new("bind-addr").long("bind-addr").default_value(d.str("bind-addr", "127.0.0.1:10080")))
        .arg(Arg::new("ca-bundle").long("ca-bundle").default_value(d.str("ca-bundle", "~/.iamlive/ca.pem")))
        .arg(Arg::new("ca-key").long("ca-key").default_value(d.str("ca-key", "~/.iamlive/ca.key")))
        .arg(Arg::new("account-id").long("account-id").default_value(d.str("account-id", "")))
        .arg(bool_arg("background", "run without interactive terminal rendering", d.bool_str("background", false)))
        .arg(Arg::new("override-aws-map").long("override-aws-map").default_value(d.str("override-aws-map", "")))
        .arg(bool_arg("debug", "print the policy document unbuffered, with no ANSI clearing", d.bool_str("debug", false)))
        .arg(bool_arg(
            "force-wildcard-resource",
            "always emit a wildcard resource",
            d.bool_str("force-wildcard-resource", false),
        ))
        .arg(
            Arg::new("csm-port")
                .long("csm-port")
                .default_value(d.str("csm-port", "31000"))
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(Arg::new("aws-redirect-host").long("aws-redirect-host").default_value(d.str("aws-redirect-host", "")))
        .arg(Arg::new("cpu-profile").long("cpu-profile").default_value(d.str("cpu-profile", "")))
}

pub fn parse(defaults: &HashMap<String, String>) -> CliArgs {
    let matches = command(defaults).get_matches();

    let get = |name: &str| matches.get_one::<String>(name).cloned().unwrap_or_default();
    let get_opt = |name: &str| Some(get(name)).filter(|v| !v.is_empty());
    let get_bool = |name: &str| matches.get_one::<bool>(name).copied().unwrap_or(false);

    let mut provider = get("provider");
    let mut mode = get("mode");
    if !provider.eq_ignore_ascii_case("aws") {
        // Non-AWS providers don't have a CSM ingestion path.
        mode = "proxy".to_string();
    }
    provider = provider.to_ascii_lowercase();

    CliArgs {
        provider,
        set_ini: get_bool("set-ini"),
        profile: get("profile"),
        fails_only: get_bool("fails-only"),
        output_file: get_opt("output-file"),
        refresh_rate: matches.get_one::<u64>("refresh-rate").copied().unwrap_or(0),
        sort_alphabetical: get_bool("sort-alphabetical"),
        host: get("host"),
        mode,
        bind_addr: get("bind-addr"),
        ca_bundle: get("ca-bundle"),
        ca_key: get("ca-key"),
        account_id: get_opt("account-id"),
        background: get_bool("background"),
        override_aws_map: get_opt("override-aws-map"),
        debug: get_bool("debug"),
        force_wildcard_resource: get_bool("force-wildcard-resource"),
        csm_port: matches.get_one::<u16>("csm-port").copied().unwrap_or(31000),
        aws_redirect_host: get_opt("aws-redirect-host"),
        cpu_profile: get_opt("cpu-profile"),
    }
}
