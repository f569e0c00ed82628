//! Entry point for the fleetwatch TUI. Parses args, resolves the backend
//! endpoints and runs the App.

mod app;

use anyhow::Context;
use app::App;
use fleetwatch::api::ApiClient;
use fleetwatch::config::{self, Config};
use fleetwatch::dashboard::Dashboard;
use fleetwatch::download::download_url;
use fleetwatch::logging;
use fleetwatch::profiles::{
    load_profiles, save_profiles, ProfileEntry, ProfileRequest, ProfilesFile, ResolveProfile,
};
use fleetwatch::push::PushClient;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const USAGE_ARGS: &str = "[--api URL] [--push URL] [--tls-ca CERT_PEM|-t CERT_PEM] [--profile NAME|-P NAME] [--save] [--dry-run] [--download CODE:PATH [--out FILE]]";

#[derive(Debug, Default)]
struct ParsedArgs {
    api: Option<String>,
    push: Option<String>,
    tls_ca: Option<String>,
    profile: Option<String>,
    save: bool,
    dry_run: bool,
    download: Option<String>,
    out: Option<String>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "fleetwatch".into());
    let mut parsed = ParsedArgs::default();

    while let Some(arg) = it.next() {
        // --flag=value form
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = || inline.clone().or_else(|| it.next()).filter(|v| !v.is_empty());
        match flag.as_str() {
            "-h" | "--help" => {
                return Err(format!("Usage: {prog} {USAGE_ARGS}"));
            }
            "--api" => parsed.api = value(),
            "--push" => parsed.push = value(),
            "--tls-ca" | "-t" => parsed.tls_ca = value(),
            "--profile" | "-P" => parsed.profile = value(),
            "--download" => parsed.download = value(),
            "--out" | "-o" => parsed.out = value(),
            "--save" => parsed.save = true,
            "--dry-run" => parsed.dry_run = true,
            _ => {
                return Err(format!(
                    "Unexpected argument '{arg}'. Usage: {prog} {USAGE_ARGS}"
                ));
            }
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let _log_guard = logging::init(&config::log_dir())?;

    let Some(entry) = resolve_entry(&parsed)? else {
        return Ok(());
    };
    let cfg = Config::from_entry(&entry)?;
    if parsed.dry_run {
        println!("api:  {}\npush: {}", cfg.api_url, cfg.push_url);
        return Ok(());
    }
    tracing::info!(api = %cfg.api_url, push = %cfg.push_url, "starting");

    let tls_ca = cfg.tls_ca.as_deref().and_then(|p| p.to_str());
    let api = ApiClient::new(cfg.api_url.as_str(), tls_ca)
        .with_context(|| format!("creating client for {}", cfg.api_url))?;

    if let Some(spec) = parsed.download.as_deref() {
        return download_once(&api, spec, parsed.out.as_deref()).await;
    }

    let push = Arc::new(
        PushClient::new(cfg.push_url.as_str(), cfg.tls_ca.as_deref())
            .with_context(|| format!("creating push client for {}", cfg.push_url))?,
    );

    let cancel = CancellationToken::new();
    // handlers are bound here, before the first frame can arrive
    let dashboard = Dashboard::new(api, push.clone(), cancel.child_token());
    let push_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { push.run(cancel).await })
    };

    let mut app = App::new(dashboard);
    let res = app.run().await;

    cancel.cancel();
    let _ = push_task.await;
    res
}

// Fetch one file from a server's agent and exit: --download CODE:PATH
async fn download_once(api: &ApiClient, spec: &str, out: Option<&str>) -> anyhow::Result<()> {
    let (code, path) = spec
        .split_once(':')
        .context("--download expects CODE:PATH")?;
    let servers = api.servers().await?;
    let server = fleetwatch::reconcile::hydrate(&servers)
        .into_iter()
        .find(|s| s.code == code)
        .with_context(|| format!("unknown server '{code}'"))?;
    let filename = out.and_then(|o| {
        PathBuf::from(o)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    });
    let url = download_url(&server, path, filename.as_deref())
        .map_err(|e| anyhow::anyhow!("{}: {}", e.field, e.message))?;
    let dest = match out {
        Some(o) => PathBuf::from(o),
        None => PathBuf::from(
            PathBuf::from(path)
                .file_name()
                .context("path has no file name; pass --out")?,
        ),
    };
    let bytes = api.download(&url, &dest).await?;
    eprintln!("saved {} ({bytes} bytes)", dest.display());
    Ok(())
}

/// Flags > named profile > environment. `None` means the user aborted a prompt.
fn resolve_entry(parsed: &ParsedArgs) -> anyhow::Result<Option<ProfileEntry>> {
    let profiles_file = load_profiles();
    let req = ProfileRequest {
        profile_name: parsed.profile.clone(),
        api_url: parsed.api.clone(),
        push_url: parsed.push.clone(),
        tls_ca: parsed.tls_ca.clone(),
    };

    // env counts as an explicit choice only when no profile was named
    let env_set = env::var_os(config::ENV_API_URL).is_some();
    let resolved = match req.resolve(&profiles_file) {
        ResolveProfile::PromptSelect(_) if env_set => ResolveProfile::Defaults,
        other => other,
    };

    let mut profiles_mut = profiles_file.clone();
    let entry = match resolved {
        ResolveProfile::Direct(entry) => {
            if let Some(name) = parsed.profile.as_ref() {
                maybe_save(&mut profiles_mut, name, &entry, parsed.save)?;
            }
            entry
        }
        ResolveProfile::Loaded(entry) => entry,
        ResolveProfile::Defaults => {
            let mut entry = config::env_entry();
            if parsed.push.is_some() {
                entry.push_url = parsed.push.clone();
            }
            entry.tls_ca = parsed.tls_ca.clone();
            entry
        }
        ResolveProfile::PromptSelect(names) => {
            eprintln!("Select profile:");
            for (i, n) in names.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, n);
            }
            let line = prompt_string("Enter number (or blank to abort): ")?;
            let picked = line
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| idx.checked_sub(1))
                .and_then(|idx| names.get(idx))
                .and_then(|name| profiles_mut.profiles.get(name));
            match picked {
                Some(entry) => entry.clone(),
                None => return Ok(None),
            }
        }
        ResolveProfile::PromptCreate(name) => {
            eprintln!("Profile '{name}' does not exist yet.");
            let api_url = prompt_string("Enter API URL (http://HOST:PORT): ")?;
            if api_url.trim().is_empty() {
                return Ok(None);
            }
            let push_url = prompt_string("Enter push URL (blank derives ws://HOST:PORT/ws): ")?;
            let ca = prompt_string("Enter TLS CA path (or leave blank): ")?;
            let non_blank = |s: String| Some(s.trim().to_string()).filter(|s| !s.is_empty());
            let entry = ProfileEntry {
                api_url: api_url.trim().to_string(),
                push_url: non_blank(push_url),
                tls_ca: non_blank(ca),
            };
            profiles_mut.profiles.insert(name, entry.clone());
            save_profiles(&profiles_mut).context("saving profiles")?;
            entry
        }
    };
    Ok(Some(entry))
}

fn maybe_save(
    profiles: &mut ProfilesFile,
    name: &str,
    entry: &ProfileEntry,
    force: bool,
) -> anyhow::Result<()> {
    let overwrite = match profiles.profiles.get(name) {
        // New profile: auto-save immediately
        None => true,
        Some(existing) if existing == entry => false,
        Some(_) => {
            force || prompt_yes_no(&format!("Overwrite existing profile '{name}'? [y/N]: "))
        }
    };
    if overwrite {
        profiles.profiles.insert(name.to_string(), entry.clone());
        save_profiles(profiles).context("saving profiles")?;
    }
    Ok(())
}

fn prompt_yes_no(prompt: &str) -> bool {
    match prompt_string(prompt) {
        Ok(line) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn prompt_string(prompt: &str) -> io::Result<String> {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}
