use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http::Method;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::admin::AdminEndpoints;
use crate::config::AppConfig;
use crate::dispatcher::{Dispatcher, HandlerResponse, ResponseBody};
use crate::mapping::load_routes;
use crate::request::RequestContext;

/// Command-line interface for routebind
#[derive(Parser)]
#[command(name = "routebind")]
#[command(about = "Inspect and exercise route definition files", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Request line and headers shared by `match` and `dispatch`
#[derive(clap::Args, Debug, Clone)]
pub struct RequestArgs {
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request path, optionally with a query string
    #[arg(short, long)]
    pub path: String,

    /// Extra header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    #[arg(long)]
    pub accept: Option<String>,

    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the routes in a definition file
    Routes {
        /// Route definition file (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Show which route a request selects, without invoking it
    Match {
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// Run a request through the full pipeline and print the response
    Dispatch {
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        request: RequestArgs,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,

        /// Application config (YAML or TOML)
        #[arg(short, long, env = "ROUTEBIND_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Run the CLI, writing to stdout.
///
/// # Errors
///
/// Unreadable files, invalid route definitions or request arguments.
pub fn run_cli(cli: Cli) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_cli_with_writer(&cli, &mut out)
}

/// Run the CLI, writing its report to `out`.
///
/// # Errors
///
/// See [`run_cli`].
pub fn run_cli_with_writer<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    match &cli.command {
        Commands::Routes { file } => {
            let dispatcher = load_dispatcher(file, None)?;
            for registered in dispatcher.table().all_routes().iter() {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    registered.id,
                    registered.route.describe(),
                    registered.route.handler().name()
                )?;
            }
            Ok(())
        }
        Commands::Match { file, request } => {
            let dispatcher = load_dispatcher(file, None)?;
            let req = build_request(request, None)?;
            match dispatcher.matcher().match_request(&req) {
                Ok(matched) => {
                    let vars: Map<String, Value> = matched
                        .path_variables
                        .iter()
                        .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                        .collect();
                    writeln!(out, "handler: {}", matched.handler_name())?;
                    writeln!(out, "mapping: {}", matched.route.describe())?;
                    writeln!(out, "path_variables: {}", Value::Object(vars))?;
                }
                Err(e) => {
                    writeln!(out, "no match ({}): {e}", e.status().as_u16())?;
                }
            }
            Ok(())
        }
        Commands::Dispatch {
            file,
            request,
            body,
            config,
        } => {
            let config = config
                .as_deref()
                .map(AppConfig::load)
                .transpose()?;
            let dispatcher = load_dispatcher(file, config.as_ref())?;
            let admin = AdminEndpoints::new(
                config
                    .as_ref()
                    .map_or("/admin", |c| c.admin_prefix.as_str()),
            );
            let req = build_request(request, body.as_deref())?;
            let response = admin.dispatch(&dispatcher, req);
            write_response(out, &response)?;
            dispatcher.shutdown(Duration::from_secs(5));
            Ok(())
        }
    }
}

fn load_dispatcher(file: &Path, config: Option<&AppConfig>) -> Result<Dispatcher> {
    let dispatcher = match config {
        Some(c) => c.build_dispatcher()?,
        None => Dispatcher::new(),
    };
    for definition in load_routes(file)? {
        let route = definition
            .to_descriptor()
            .with_context(|| format!("invalid route '{}'", definition.handler_name()))?;
        dispatcher
            .register(route)
            .with_context(|| format!("failed to register route '{}'", definition.handler_name()))?;
    }
    Ok(dispatcher)
}

fn build_request(args: &RequestArgs, body: Option<&str>) -> Result<RequestContext> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method '{}'", args.method))?;
    let mut builder = RequestContext::builder(method, &args.path);
    for raw in &args.headers {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("header '{raw}' is not in `Name: value` form"))?;
        builder = builder.header(name.trim(), value.trim());
    }
    if let Some(accept) = &args.accept {
        builder = builder.header("Accept", accept);
    }
    if let Some(ct) = &args.content_type {
        builder = builder.header("Content-Type", ct);
    }
    if let Some(body) = body {
        builder = builder.body(body.as_bytes().to_vec());
    }
    Ok(builder.build())
}

fn write_response<W: Write>(out: &mut W, response: &HandlerResponse) -> Result<()> {
    writeln!(out, "status: {}", response.status)?;
    for (name, value) in &response.headers {
        writeln!(out, "{name}: {value}")?;
    }
    match &response.body {
        ResponseBody::Empty => {}
        ResponseBody::Json(v) => writeln!(out, "\n{}", serde_json::to_string_pretty(v)?)?,
        ResponseBody::Text(s) => writeln!(out, "\n{s}")?,
        ResponseBody::Bytes(b) => writeln!(out, "\n<{} bytes>", b.len())?,
    }
    Ok(())
}
