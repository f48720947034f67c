use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wikibot_core::bot::WikiBot;
use wikibot_core::category::move_category_pages;
use wikibot_core::client::{MediaWikiClient, WikiReadApi};
use wikibot_core::config::{DEFAULT_CONFIG_PATH, load_config};
use wikibot_core::credentials::{Credentials, DEFAULT_CREDENTIALS_PATH, load_credentials};
use wikibot_core::download::{DownloadOptions, download_pages};
use wikibot_core::site::SiteVariant;
use wikibot_core::spacing::fix_spacings;

#[derive(Debug, Parser)]
#[command(
    name = "wikibot",
    version,
    about = "Download and bulk-edit pages on a MediaWiki site"
)]
struct Cli {
    #[arg(long, global = true, value_name = "HOST", help = "Hostname, or site name for farm wikis")]
    site: Option<String>,
    #[arg(long, global = true, default_value = "standalone", value_name = "FARM")]
    farm: SiteVariant,
    #[arg(long, global = true, default_value = "/", value_name = "PATH", help = "Script path holding api.php")]
    path: String,
    #[arg(long, global = true)]
    https: bool,
    #[arg(long, global = true, value_name = "PATH")]
    credentials: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    username: Option<String>,
    #[arg(long, global = true)]
    password: Option<String>,
    #[arg(short, long, global = true, conflicts_with = "quiet", help = "Also log trace output")]
    verbose: bool,
    #[arg(short, long, global = true, help = "Only log warnings and errors")]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    site: Option<String>,
    farm: SiteVariant,
    path: String,
    https: bool,
    credentials: PathBuf,
    config: PathBuf,
    username: Option<String>,
    password: Option<String>,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            site: cli.site.clone(),
            farm: cli.farm,
            path: cli.path.clone(),
            https: cli.https,
            credentials: cli
                .credentials
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH)),
            config: cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            username: cli.username.clone(),
            password: cli.password.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Check that the credentials can log in")]
    Login,
    #[command(about = "Print the site's namespace map")]
    Namespaces,
    #[command(about = "Download page wikitext into <save-path>/<hostname>/<namespace>/")]
    Download(DownloadArgs),
    #[command(name = "move-category", about = "Move pages from one category to another")]
    MoveCategory(MoveCategoryArgs),
    #[command(name = "fix-spacings", about = "Normalize header, list and definition spacing")]
    FixSpacings(FixSpacingsArgs),
}

#[derive(Debug, Args)]
struct DownloadArgs {
    #[arg(long, default_value = ".", value_name = "PATH")]
    save_path: PathBuf,
    #[arg(short = 'c', long, value_name = "NAME", help = "Only pages in this category")]
    category: Option<String>,
    #[arg(long, help = "Only titles starting with this prefix")]
    prefix: Option<String>,
    #[arg(short = 'n', long, value_name = "NAME", help = "Namespace display name (default: main)")]
    namespace: Option<String>,
    #[arg(long, help = "Stop after this many listed pages")]
    limit: Option<usize>,
    #[arg(long, help = "Also download redirect pages")]
    redirects: bool,
}

#[derive(Debug, Args)]
struct MoveCategoryArgs {
    old: String,
    new: String,
    #[arg(long, default_value_t = 1000, value_name = "MS", help = "Pause between edits")]
    delay_ms: u64,
}

#[derive(Debug, Args)]
struct FixSpacingsArgs {
    #[arg(required = true)]
    titles: Vec<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Login) => run_login(&runtime),
        Some(Commands::Namespaces) => run_namespaces(&runtime),
        Some(Commands::Download(args)) => run_download(&runtime, args),
        Some(Commands::MoveCategory(args)) => run_move_category(&runtime, args),
        Some(Commands::FixSpacings(args)) => run_fix_spacings(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn log_directive(cli: &Cli) -> String {
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "trace"
    } else {
        "debug"
    };
    format!("warn,wikibot={level},wikibot_core={level}")
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(cli)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();
}

struct Session {
    bot: WikiBot<MediaWikiClient>,
    credentials: Credentials,
}

impl Session {
    fn login(&mut self, runtime: &RuntimeOptions) -> Result<()> {
        if !self.credentials.has_login() {
            bail!(
                "no credentials: set USERNAME and PASSWORD in {} or pass --username/--password",
                runtime.credentials.display()
            );
        }
        let outcome = self
            .bot
            .login(&self.credentials.username, &self.credentials.password);
        if !outcome.success {
            bail!(
                "login as '{}' failed: {}",
                self.credentials.username,
                outcome.diagnostic.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }
}

fn open_session(runtime: &RuntimeOptions) -> Result<Session> {
    let credentials = load_credentials(&runtime.credentials)?
        .with_overrides(runtime.username.clone(), runtime.password.clone());
    let config = load_config(&runtime.config)?;

    let site = match (&runtime.site, runtime.farm) {
        (Some(site), farm) => farm.connection(site, &runtime.path, runtime.https),
        (None, SiteVariant::Standalone) => match credentials.site()? {
            Some(site) => site,
            None => bail!(
                "no site given: pass --site or set SITEURL in {}",
                runtime.credentials.display()
            ),
        },
        (None, farm) => bail!("--farm {farm} requires --site <name>"),
    };

    let bot = WikiBot::open(runtime.farm, site, config.client_settings())?;
    Ok(Session { bot, credentials })
}

fn run_login(runtime: &RuntimeOptions) -> Result<()> {
    let mut session = open_session(runtime)?;
    let credentials = &session.credentials;
    let outcome = session
        .bot
        .login(&credentials.username, &credentials.password);

    println!("login");
    println!("site: {}", session.bot.url());
    println!("wikifarm: {}", session.bot.wikifarm().unwrap_or("<none>"));
    println!("username: {}", display_or_none(&credentials.username));
    println!("success: {}", format_flag(outcome.success));
    println!("logged_in: {}", format_flag(session.bot.is_logged_in()));
    if let Some(diagnostic) = &outcome.diagnostic {
        println!("diagnostic: {diagnostic}");
    }
    Ok(())
}

fn run_namespaces(runtime: &RuntimeOptions) -> Result<()> {
    let mut session = open_session(runtime)?;
    let url = session.bot.url();
    let namespaces = session.bot.namespaces()?;

    println!("namespaces");
    println!("site: {url}");
    println!("namespaces.count: {}", namespaces.len());
    for (name, index) in namespaces.iter() {
        println!("namespace.{name}: {index}");
    }
    Ok(())
}

fn run_download(runtime: &RuntimeOptions, args: DownloadArgs) -> Result<()> {
    let mut session = open_session(runtime)?;
    let options = DownloadOptions {
        save_path: args.save_path,
        category: args.category,
        prefix: args.prefix,
        namespace: args.namespace,
        limit: args.limit,
        include_redirects: args.redirects,
    };
    let report = download_pages(&mut session.bot, &options)?;

    println!("download");
    println!("site: {}", session.bot.url());
    println!(
        "save_path: {}",
        options.save_path.join(session.bot.hostname()).display()
    );
    println!("listed: {}", report.listed);
    println!("downloaded: {}", report.downloaded);
    println!("skipped_redirects: {}", report.skipped_redirects);
    println!("skipped_category: {}", report.skipped_category);
    for title in &report.escaped {
        println!("escaped: {title}");
    }
    print_errors(&report.errors);
    println!("requests: {}", session.bot.api().request_count());
    Ok(())
}

fn run_move_category(runtime: &RuntimeOptions, args: MoveCategoryArgs) -> Result<()> {
    let mut session = open_session(runtime)?;
    session.login(runtime)?;
    let report = move_category_pages(
        &mut session.bot,
        &args.old,
        &args.new,
        Duration::from_millis(args.delay_ms),
    )?;

    println!("move-category");
    println!("site: {}", session.bot.url());
    println!("from: Category:{}", args.old);
    println!("to: Category:{}", args.new);
    println!("members: {}", report.members);
    println!("moved: {}", report.moved_count());
    for title in &report.unchanged {
        println!("unchanged: {title} (category not set by a literal link)");
    }
    print_errors(&report.errors);
    Ok(())
}

fn run_fix_spacings(runtime: &RuntimeOptions, args: FixSpacingsArgs) -> Result<()> {
    let mut session = open_session(runtime)?;
    session.login(runtime)?;
    let report = fix_spacings(&mut session.bot, &args.titles)?;

    println!("fix-spacings");
    println!("site: {}", session.bot.url());
    println!("fixed: {}", report.fixed.len());
    println!("unchanged: {}", report.unchanged.len());
    for title in &report.fixed {
        println!("fixed.title: {title}");
    }
    print_errors(&report.errors);
    Ok(())
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("errors:");
    for error in errors {
        println!("  - {error}");
    }
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() { "<none>" } else { value }
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
