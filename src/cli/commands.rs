//! Handlers of the one-shot commands. Every handler loads the configuration, performs one
//! action and prints a human readable result.

use ansi_term::Colour::{Green, Red, Yellow};
use anyhow::Result;

use crate::{
    blocking::{
        enforcer::Enforcer,
        processes::{list_running, KillReport, SysinfoProcessTable},
    },
    config::{BlockConfig, ConfigStore},
    daemon::lock::{inspect, LockState},
    utils::dir::AppPaths,
};

/// Everything a command handler needs.
pub struct Session {
    pub paths: AppPaths,
    pub store: ConfigStore,
    pub enforcer: Enforcer,
}

impl Session {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            store: ConfigStore::new(paths.config.clone()),
            enforcer: Enforcer::for_system(paths.hosts.clone()),
            paths,
        }
    }

    pub fn with_enforcer(paths: AppPaths, enforcer: Enforcer) -> Self {
        Self {
            store: ConfigStore::new(paths.config.clone()),
            enforcer,
            paths,
        }
    }
}

fn print_list(title: &str, items: &[String], empty: &str) {
    if items.is_empty() {
        println!("{empty}");
        return;
    }
    println!("{title}");
    for item in items {
        println!("  - {item}");
    }
}

fn print_kills(report: &KillReport) {
    for process in &report.killed {
        println!("Killed blocked app: {} (pid {})", process.name, process.pid);
    }
    for failure in &report.failed {
        println!("{} {failure}", Yellow.paint("warning:"));
    }
}

fn warn_overlap(config: &BlockConfig) {
    for url in config.overlapping_urls() {
        println!(
            "{} {url} is also blocked through the hosts file, the whole domain stays unreachable.",
            Yellow.paint("warning:")
        );
    }
}

fn unique_count(values: &[String]) -> usize {
    let mut unique = values.iter().map(|v| v.to_lowercase()).collect::<Vec<_>>();
    unique.sort();
    unique.dedup();
    unique.len()
}

pub async fn block(session: &mut Session) -> Result<()> {
    let config = session.store.load().await?;
    let report = session.enforcer.reconcile(&config).await;

    warn_overlap(&config);
    if report.failures.is_empty() {
        println!("Blocked {} sites.", unique_count(&config.blocked_sites));
        println!("Applied {} URL patterns.", report.url_patterns);
    }
    print_kills(&report.kills);
    if !report.kills.killed.is_empty() {
        println!("Killed {} blocked app(s).", report.kills.killed.len());
    }
    report.into_result()?;
    Ok(())
}

pub async fn unblock(session: &mut Session) -> Result<()> {
    let removed = session.enforcer.unblock().await?;
    println!("All sites unblocked ({removed} hosts entries removed).");
    println!("URL policies cleared.");
    Ok(())
}

async fn reapply_sites(session: &mut Session, config: &BlockConfig) -> Result<()> {
    session.enforcer.apply_sites(&config.blocked_sites).await?;
    println!("Blocked {} sites.", unique_count(&config.blocked_sites));
    Ok(())
}

async fn reapply_urls(session: &mut Session, config: &BlockConfig) -> Result<()> {
    let count = session.enforcer.apply_urls(&config.blocked_urls)?;
    println!("Applied {count} URL patterns.");
    Ok(())
}

pub async fn add_site(session: &mut Session, domain: &str) -> Result<()> {
    let added = session.store.add_site(domain).await?;
    if added.is_empty() {
        println!("'{domain}' is already in the block list.");
    } else {
        println!("Added {} to the block list.", added.join(", "));
    }
    let config = session.store.load().await?;
    warn_overlap(&config);
    reapply_sites(session, &config).await
}

pub async fn remove_site(session: &mut Session, domain: &str) -> Result<()> {
    let removed = session.store.remove_site(domain).await?;
    if removed.is_empty() {
        println!("'{domain}' was not in the block list.");
    } else {
        println!("Removed {} from the block list.", removed.join(", "));
    }
    let config = session.store.load().await?;
    reapply_sites(session, &config).await
}

pub async fn add_url(session: &mut Session, pattern: &str) -> Result<()> {
    let added = session.store.add_url(pattern).await?;
    if added.is_empty() {
        println!("'{pattern}' is already in the URL block list.");
    } else {
        println!("Added {} to the URL block list.", added.join(", "));
    }
    let config = session.store.load().await?;
    warn_overlap(&config);
    reapply_urls(session, &config).await
}

pub async fn remove_url(session: &mut Session, pattern: &str) -> Result<()> {
    let removed = session.store.remove_url(pattern).await?;
    if removed.is_empty() {
        println!("'{pattern}' was not in the URL block list.");
    } else {
        println!("Removed {} from the URL block list.", removed.join(", "));
    }
    let config = session.store.load().await?;
    reapply_urls(session, &config).await
}

pub async fn add_app(session: &mut Session, name: &str) -> Result<()> {
    if session.store.add_app(name).await? {
        println!("Added '{name}' to blocked apps.");
    } else {
        println!("'{name}' is already in the blocked apps list.");
    }
    let config = session.store.load().await?;
    print_kills(&session.enforcer.kill_apps(&config.blocked_apps));
    Ok(())
}

pub async fn remove_app(session: &mut Session, name: &str) -> Result<()> {
    if session.store.remove_app(name).await? {
        println!("Removed '{name}' from blocked apps.");
    } else {
        println!("'{name}' was not in the blocked apps list.");
    }
    Ok(())
}

pub async fn kill_apps(session: &mut Session) -> Result<()> {
    let config = session.store.load().await?;
    if config.blocked_apps.is_empty() {
        println!("No apps in the block list.");
        return Ok(());
    }
    let report = session.enforcer.kill_apps(&config.blocked_apps);
    print_kills(&report);
    if report.killed.is_empty() {
        println!("No blocked apps are currently running.");
    }
    Ok(())
}

pub fn list_apps() {
    let processes = list_running(&mut SysinfoProcessTable::new());
    println!("Currently running processes:");
    for process in &processes {
        println!("  {process}");
    }
    println!();
    println!("Total: {} processes", processes.len());
    println!("Use the exact process name with 'addapp' to block it.");
}

pub async fn list(session: &Session) -> Result<()> {
    let config = session.store.load().await?;
    print_list("Blocked sites:", &config.blocked_sites, "No blocked sites.");
    println!();
    print_list("Blocked URLs:", &config.blocked_urls, "No blocked URLs.");
    println!();
    print_list("Blocked apps:", &config.blocked_apps, "No blocked apps.");
    Ok(())
}

pub async fn status(session: &mut Session) -> Result<()> {
    let config = session.store.load().await?;

    let domains = session.enforcer.hosts().managed_domains().await?;
    print_list(
        "Currently blocked sites:",
        &domains,
        "No sites are currently blocked.",
    );
    println!();

    match session.enforcer.policy().current() {
        Ok(patterns) => print_list(
            "Currently blocked URLs:",
            &patterns,
            "No URLs are currently blocked.",
        ),
        Err(e) => println!("{} can't read URL policy: {e}", Yellow.paint("warning:")),
    }
    println!();

    print_list(
        "Blocked apps (will be killed when detected):",
        &config.blocked_apps,
        "No apps are being blocked.",
    );
    println!();
    warn_overlap(&config);

    let daemon = match inspect(&session.paths.lock, session.enforcer.processes())? {
        LockState::Held { pid } => format!("{} (pid {pid})", Green.paint("running")),
        LockState::Stale { pid: Some(pid) } => {
            format!("{} (stale lock of pid {pid})", Red.paint("stopped"))
        }
        LockState::Stale { pid: None } => format!("{} (unreadable lock)", Red.paint("stopped")),
        LockState::Free => Red.paint("stopped").to_string(),
    };
    println!("Daemon: {daemon}");
    println!("Config file: {}", session.paths.config.display());
    Ok(())
}
