//! CLI command handlers binding lifecycle events to the cache core.

use clap::Args;
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheLayer, CacheStorage, Request, SqliteStorage, StoreManager};
use crate::config::Config;
use crate::net::HttpClient;

#[derive(Args, Debug)]
pub struct FetchArgs {
  /// URLs or origin-relative paths to resolve
  #[arg(required = true)]
  pub locators: Vec<String>,

  /// HTTP method
  #[arg(short = 'X', long, default_value = "GET")]
  pub method: String,

  /// Extra request header, as 'Name: value' (repeatable)
  #[arg(short = 'H', long = "header")]
  pub headers: Vec<String>,

  /// Request body
  #[arg(short, long)]
  pub data: Option<String>,

  /// Write response bodies here instead of stdout
  #[arg(short, long)]
  pub output: Option<PathBuf>,
}

/// Shared handles for one invocation, all bound to the configured generation.
pub struct Context {
  config: Config,
  storage: Arc<SqliteStorage>,
  network: Arc<HttpClient>,
}

impl Context {
  pub fn new(config: Config) -> Result<Self> {
    let path = match &config.database {
      Some(path) => path.clone(),
      None => SqliteStorage::default_path()?,
    };

    let storage = SqliteStorage::open(&path, &config.generation)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
    let network = HttpClient::new(config.origin.clone(), &config.network)?;

    Ok(Self {
      config,
      storage: Arc::new(storage),
      network: Arc::new(network),
    })
  }
}

pub async fn activate(ctx: &Context) -> Result<()> {
  let manifest = ctx.config.manifest_urls()?;
  let manager = StoreManager::new(ctx.storage.clone(), ctx.network.clone(), manifest);

  let installed = manager
    .activate()
    .await
    .map_err(|e| eyre!("Installation of {} failed: {}", ctx.config.generation, e))?;

  println!("Installed {} ({} entries)", ctx.config.generation, installed);
  Ok(())
}

pub async fn fetch(ctx: &Context, args: FetchArgs) -> Result<()> {
  // Requests are only served once the generation has been installed
  if !ctx.storage.is_installed()? {
    return Err(eyre!(
      "Cache generation {} is not installed. Run `zerodex activate` first.",
      ctx.config.generation
    ));
  }

  let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", args.method, e))?;
  let headers = parse_headers(&args.headers)?;
  let body = args.data.map(String::into_bytes);

  let requests = args
    .locators
    .iter()
    .map(|locator| {
      Ok(Request {
        method: method.clone(),
        url: ctx.config.resolve_locator(locator)?,
        headers: headers.clone(),
        body: body.clone(),
      })
    })
    .collect::<Result<Vec<_>>>()?;

  let layer = CacheLayer::new(ctx.storage.clone(), ctx.network.clone());
  let results = join_all(requests.iter().map(|request| layer.resolve(request))).await;

  let mut out: Box<dyn Write> = match &args.output {
    Some(path) => Box::new(std::fs::File::create(path)?),
    None => Box::new(io::stdout().lock()),
  };

  let mut failures = 0;
  for (request, result) in requests.iter().zip(results) {
    match result {
      Ok(result) => {
        let stored = result
          .cached_at
          .map(|at| format!(", stored {}", at.format("%Y-%m-%d %H:%M:%S")))
          .unwrap_or_default();
        eprintln!(
          "{} {} [{}{}] {} bytes",
          result.data.status,
          request.url,
          result.source,
          stored,
          result.data.body().len()
        );
        out.write_all(&result.data.into_body())?;
      }
      Err(e) => {
        failures += 1;
        eprintln!("ERR {} {}", request.url, e);
      }
    }
  }
  out.flush()?;

  if failures > 0 {
    return Err(eyre!("{} of {} requests failed", failures, requests.len()));
  }
  Ok(())
}

pub fn status(ctx: &Context) -> Result<()> {
  let entries = ctx.storage.entries()?;

  println!("Generation: {}", ctx.storage.generation());
  println!(
    "Installed:  {}",
    if ctx.storage.is_installed()? { "yes" } else { "no" }
  );
  println!("Entries:    {}", entries.len());

  for entry in entries {
    println!(
      "  {} {:>9} {} {} {} {}",
      entry.status,
      entry.size,
      entry.digest.get(..12).unwrap_or(&entry.digest),
      entry.stored_at.format("%Y-%m-%d %H:%M:%S"),
      entry.content_type.as_deref().unwrap_or("-"),
      entry.locator
    );
  }

  Ok(())
}

/// Remove every generation other than the configured one.
pub fn prune(ctx: &Context) -> Result<()> {
  let current = ctx.storage.generation();
  let mut pruned = 0;

  for generation in ctx.storage.generations()? {
    if generation.name == current {
      continue;
    }
    let removed = ctx.storage.delete_generation(&generation.name)?;
    info!(generation = %generation.name, removed, "pruned cache generation");
    println!("Removed {} ({} entries)", generation.name, removed);
    pruned += 1;
  }

  if pruned == 0 {
    println!("Nothing to prune");
  }
  Ok(())
}

/// Parse `Name: value` header arguments.
fn parse_headers(raw: &[String]) -> Result<HeaderMap> {
  let mut headers = HeaderMap::new();

  for header in raw {
    let (name, value) = header
      .split_once(':')
      .ok_or_else(|| eyre!("Invalid header '{}', expected 'Name: value'", header))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
      .map_err(|e| eyre!("Invalid header name in '{}': {}", header, e))?;
    let value = HeaderValue::from_str(value.trim())
      .map_err(|e| eyre!("Invalid header value in '{}': {}", header, e))?;
    headers.append(name, value);
  }

  Ok(headers)
}
