use colored::Colorize;
use tracing::info;
use tracing_subscriber;

use clap::{value_t, values_t, App, AppSettings, Arg, ArgMatches, SubCommand};

use peer_rpc::protocol::{EchoRequest, EchoResponse, IdentifyResponse, ECHO_PROTOCOL, IDENTIFY_PROTOCOL};
use peer_rpc::{
    assemble_addr_info, exec_rpc, new_tcp_host, CallContext, HostConfig, ProtocolId, Result,
    Router, RpcTook, Server,
};

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = App::new("peer-rpc")
        .version("0.1")
        .about("Calls, and answers, single request/response RPCs between peers")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Logs at debug level"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG_FILE")
                .takes_value(true),
        )
        .subcommand(
            SubCommand::with_name("serve").about("Answers echo and identify calls").arg(
                Arg::with_name("listen")
                    .short("l")
                    .long("listen")
                    .value_name("LISTEN_ADDR")
                    .default_value("127.0.0.1:4001")
                    .takes_value(true),
            ),
        )
        .subcommand(
            SubCommand::with_name("call")
                .about("Sends one request to a peer and prints the reply with its timings")
                .arg(
                    Arg::with_name("peer")
                        .short("p")
                        .long("peer")
                        .value_name("PEER_ID")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("addr")
                        .short("a")
                        .long("addr")
                        .value_name("MULTIADDR")
                        .multiple(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("protocol")
                        .long("protocol")
                        .value_name("PROTOCOL")
                        .possible_values(&["echo", "identify"])
                        .default_value("echo"),
                )
                .arg(
                    Arg::with_name("message")
                        .short("m")
                        .long("message")
                        .value_name("MESSAGE")
                        .default_value("hello"),
                )
                .arg(
                    Arg::with_name("timeout")
                        .short("t")
                        .long("timeout")
                        .value_name("SECS")
                        .takes_value(true),
                ),
        )
        .get_matches();

    let level = if matches.is_present("verbose") { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact()
        .with_max_level(level)
        .init();

    let config = HostConfig::load(matches.value_of("config").map(Path::new))?;

    match matches.subcommand() {
        ("serve", Some(serve)) => run_server(serve, &config).await,
        ("call", Some(call)) => run_call(call, config).await,
        _ => Ok(()),
    }
}

async fn run_server(matches: &ArgMatches<'_>, config: &HostConfig) -> Result<()> {
    let listen = value_t!(matches.value_of("listen"), SocketAddr).unwrap_or_else(|e| e.exit());
    let server = Server::bind(listen, config, Router::new().with_echo()).await?;
    let info = server.addr_info()?;
    println!("{} {}", "peer id:".bold(), info.peer_id);
    for addr in info.addrs.iter() {
        println!("{} {}", "address:".bold(), addr);
    }

    let handle = server.spawn();
    let sig = shutdown_signal().await?;
    info!("Got {}, stopping...", sig);
    handle.abort();
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use futures::future::FutureExt;
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(futures::select! {
        _ = sigint.recv().fuse() => "SIGINT",
        _ = sigterm.recv().fuse() => "SIGTERM"
    })
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

async fn run_call(matches: &ArgMatches<'_>, config: HostConfig) -> Result<()> {
    let addrs = values_t!(matches.values_of("addr"), String).unwrap_or_else(|e| e.exit());
    let info = assemble_addr_info(matches.value_of("peer"), addrs)?;
    let ctx = match matches.value_of("timeout") {
        Some(_) => {
            let secs = value_t!(matches.value_of("timeout"), u64).unwrap_or_else(|e| e.exit());
            CallContext::with_timeout(Duration::from_secs(secs))
        }
        None => CallContext::background(),
    };
    let (host, _) = new_tcp_host(config)?;

    match matches.value_of("protocol") {
        Some("identify") => {
            let protocol = ProtocolId::from(IDENTIFY_PROTOCOL);
            let (took, res) =
                exec_rpc::<_, (), IdentifyResponse>(&ctx, &host, &info, &protocol, None).await;
            report(&took, res.map(|rsp| {
                format!(
                    "{} ({}), protocols {}, sees us at {}",
                    rsp.peer_id,
                    rsp.agent_version,
                    rsp.protocols.join(", "),
                    rsp.observed_addr
                )
            }))
        }
        _ => {
            let protocol = ProtocolId::from(ECHO_PROTOCOL);
            let message = matches.value_of("message").unwrap_or_default().to_owned();
            let request = EchoRequest { message };
            let (took, res) =
                exec_rpc::<_, _, EchoResponse>(&ctx, &host, &info, &protocol, Some(&request)).await;
            report(&took, res.map(|rsp| format!("{} (seen as {})", rsp.message, rsp.caller)))
        }
    }
}

fn report(took: &RpcTook, res: Result<String>) -> Result<()> {
    match serde_json::to_string(took) {
        Ok(timings) => println!("{} {}", "took:".bold(), timings),
        Err(err) => info!("could not encode timings: {}", err),
    }
    match res {
        Ok(reply) => {
            println!("{} {}", "reply:".green(), reply);
            Ok(())
        }
        Err(err) => {
            for cause in err.errors() {
                println!("{} {}", "failed:".red(), cause);
            }
            Err(err)
        }
    }
}

