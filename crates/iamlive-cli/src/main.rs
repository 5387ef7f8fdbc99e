//! `iamlive` binary: CLI flag/INI composition, CA bootstrap, cloud-CLI
//! config editing, terminal rendering, and signal handling around the
//! `iamlive` library's CSM listener / proxy core and policy synthesis.

mod awsconfig;
mod ca;
mod cli;
mod iniconfig;
mod profiling;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use iamlive::action::SynthesisOptions;
use iamlive::calllog::CallLog;
use iamlive::catalog::Catalog;
use iamlive::config::Mode;
use iamlive::csm::CsmListener;
use iamlive::proxy::{ProxyConfig, ProxyServer};
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("iamlive=info".parse()?))
        .init();

    let ini_defaults = iniconfig::load(&iniconfig::default_path());
    let args = cli::parse(&ini_defaults);

    let mut catalog = Catalog::load().context("loading embedded service catalog")?;
    if let Some(path) = &args.override_aws_map {
        catalog.override_action_map(path).with_context(|| format!("loading override map {path}"))?;
    }
    let catalog = Arc::new(catalog);

    let mode = if args.mode.eq_ignore_ascii_case("proxy") { Mode::Proxy } else { Mode::Csm };
    let synthesis = SynthesisOptions {
        account_id_override: args.account_id.clone(),
        fails_only: args.fails_only,
        force_wildcard_resource: args.force_wildcard_resource,
        sort_alphabetical: args.sort_alphabetical,
    };

    let cpu_profiler = profiling::start(&args.cpu_profile)?;

    let log = CallLog::new();

    let ca_bundle_path = PathBuf::from(shellexpand::tilde(&args.ca_bundle).into_owned());
    let ca_key_path = PathBuf::from(shellexpand::tilde(&args.ca_key).into_owned());

    let awsconfig_edit = if args.set_ini {
        Some(awsconfig::apply(&awsconfig::default_path(), &args.profile, mode, &args.ca_bundle)?)
    } else {
        None
    };

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let shutdown_catalog = catalog.clone();
    let shutdown_log = log.clone();
    let shutdown_opts = synthesis.clone();
    let shutdown_provider = args.provider.clone();
    let shutdown_output = args.output_file.clone();
    let shutdown_debug = args.debug;
    let shutdown_cpu_profile = args.cpu_profile.clone();

    let shutdown = async move {
        tokio::select! {
            _ = sighup.recv() => {}
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
            _ = sigquit.recv() => {}
        }
        tracing::info!("shutting down, flushing final policy document");

        let document = if mode == Mode::Csm {
            render::synthesize_csm(&shutdown_catalog, &shutdown_log, &shutdown_opts)
        } else {
            render::synthesize(&shutdown_catalog, &shutdown_provider, &shutdown_log, &shutdown_opts)
        };
        let rendered = document.render();

        render::flush_to_terminal(&rendered, shutdown_debug);
        if let Some(path) = &shutdown_output {
            if let Err(e) = render::write_output_file(path, &rendered) {
                tracing::warn!(error = %e, path, "failed to write output file");
            }
        }

        if let Some(edit) = &awsconfig_edit {
            if let Err(e) = awsconfig::revert(edit) {
                tracing::warn!(error = %e, "failed to revert cloud CLI config edit");
            }
        }

        if let (Some(profiler), Some(path)) = (&cpu_profiler, &shutdown_cpu_profile) {
            if let Err(e) = profiler.write(path) {
                tracing::warn!(error = %e, path, "failed to write CPU profile");
            }
        }
    };

    let render_loop = render_loop(
        catalog.clone(),
        log.clone(),
        synthesis.clone(),
        args.provider.clone(),
        mode,
        args.refresh_rate,
        args.background,
        args.debug,
    );

    if mode == Mode::Proxy {
        let ca_keypair = ca::load_or_generate(&ca_bundle_path, &ca_key_path)?;
        let proxy = ProxyServer::new(
            ProxyConfig {
                bind_addr: args.bind_addr.clone(),
                aws_redirect_host: args.aws_redirect_host.clone(),
            },
            ca_keypair,
            catalog.clone(),
            log.clone(),
        );

        tokio::select! {
            result = proxy.serve() => {
                result.context("proxy core exited")?;
            }
            _ = render_loop => {}
            _ = shutdown => { std::process::exit(0); }
        }
    } else {
        let csm = CsmListener::bind(&args.host, args.csm_port).await?;

        tokio::select! {
            result = csm.run(&catalog, &log) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "csm listener failed, exiting");
                    std::process::exit(1);
                }
            }
            _ = render_loop => {}
            _ = shutdown => { std::process::exit(0); }
        }
    }

    Ok(())
}

/// Re-renders the policy document either on a fixed interval
/// (`refresh-rate` > 0) or whenever the call log changes, per §4.11. Runs
/// forever; the caller races it against shutdown/listener futures.
#[allow(clippy::too_many_arguments)]
async fn render_loop(
    catalog: Arc<Catalog>,
    log: CallLog,
    opts: SynthesisOptions,
    provider: String,
    mode: Mode,
    refresh_rate: u64,
    background: bool,
    debug: bool,
) {
    if background {
        std::future::pending::<()>().await;
        return;
    }

    if refresh_rate > 0 {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(refresh_rate));
        loop {
            ticker.tick().await;
            let doc = if mode == Mode::Csm {
                render::synthesize_csm(&catalog, &log, &opts)
            } else {
                render::synthesize(&catalog, &provider, &log, &opts)
            };
            render::flush_to_terminal(&doc.render(), debug);
        }
    } else {
        loop {
            log.notify.notified().await;
            let doc = if mode == Mode::Csm {
                render::synthesize_csm(&catalog, &log, &opts)
            } else {
                render::synthesize(&catalog, &provider, &log, &opts)
            };
            render::flush_to_terminal(&doc.render(), debug);
        }
    }
}
