use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand};
use medianotes_core::add::{AddOptions, add_titles, read_titles};
use medianotes_core::backup::{RunOptions, default_backup_path};
use medianotes_core::classify::classify_vault;
use medianotes_core::config::{MediaNotesConfig, load_config};
use medianotes_core::console::{Console, StdConsole};
use medianotes_core::embed::{EmbedOptions, embed_posters};
use medianotes_core::fix_links::{FixLinksOptions, fix_links};
use medianotes_core::http::HttpSettings;
use medianotes_core::media::Category;
use medianotes_core::migrate_games::{
    MigrateOptions, MigrationRun, PlayerMapping, migrate_games, parse_mapping_arg,
};
use medianotes_core::poster::HttpPosterFetcher;
use medianotes_core::posters::{PosterOptions, download_posters};
use medianotes_core::provider::{
    Credentials, ProviderCache, create_provider, create_screen_provider,
};
use medianotes_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_vault_exists,
    init_layout, inspect_runtime, normalize_for_display, resolve_paths,
};
use medianotes_core::standardize::{StandardizeOptions, standardize_games};
use medianotes_core::update::{UpdateOptions, update_notes};
use medianotes_core::vault::RunSummary;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "medianotes",
    version,
    about = "Enrich, rename and cross-link media notes in a markdown vault"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Vault root directory")]
    vault: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Report every decision without changing files")]
    dry_run: bool,
    #[arg(long, global = true, value_name = "PATH", help = "Backup archive path")]
    backup: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    vault: Option<PathBuf>,
    config: Option<PathBuf>,
    dry_run: bool,
    backup: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            vault: cli.vault.clone(),
            config: cli.config.clone(),
            dry_run: cli.dry_run,
            backup: cli.backup.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create notes for titles read from stdin, one per line")]
    Add(AddArgs),
    #[command(about = "Enrich and rename movie/series notes lacking a year")]
    Update,
    #[command(about = "Download missing posters and link them from frontmatter")]
    Posters(PostersArgs),
    #[command(about = "Embed each note's poster at the top of its body")]
    Embed,
    #[command(name = "fix-links", about = "Point bare wikilinks at 'Title (Year)' notes")]
    FixLinks(FixLinksArgs),
    #[command(name = "migrate-games", about = "Move player tags and status into properties")]
    MigrateGames(MigrateGamesArgs),
    #[command(name = "standardize-games", about = "Rename game notes to 'Name (Year)'")]
    StandardizeGames,
    #[command(about = "Print the media category of every note")]
    Classify,
    Status,
    Init(InitArgs),
}

#[derive(Debug, Args)]
struct AddArgs {
    #[arg(long = "media-type", value_name = "TYPE", help = "movie | tv | game | album")]
    media_type: String,
    #[arg(long, value_name = "PX")]
    poster_width: Option<u32>,
    #[arg(long, help = "Do not download posters")]
    no_posters: bool,
}

#[derive(Debug, Args)]
struct PostersArgs {
    #[arg(short = 'c', long, value_name = "TYPE", help = "Only notes of this category")]
    category: Option<String>,
    #[arg(long, value_name = "PX")]
    width: Option<u32>,
}

#[derive(Debug, Args)]
struct FixLinksArgs {
    #[arg(long, help = "Skip ambiguous links instead of prompting")]
    non_interactive: bool,
}

#[derive(Debug, Args)]
struct MigrateGamesArgs {
    #[arg(long = "filter-tag", value_name = "TAG", help = "Only notes with this tag (repeatable)")]
    filter_tags: Vec<String>,
    #[arg(
        long = "player-mapping",
        value_name = "TAG:NAMES",
        help = "Map a player tag to names, e.g. 'cjk:Craig,Jon' (repeatable)"
    )]
    player_mappings: Vec<String>,
    #[arg(long, help = "Only print the summary, not each note's changes")]
    no_summary: bool,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

/// Everything a vault command needs after the environment is resolved.
struct Session {
    paths: ResolvedPaths,
    config: MediaNotesConfig,
    run: RunOptions,
}

impl Session {
    fn http_settings(&self) -> HttpSettings {
        HttpSettings::from_config(&self.config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Add(args)) => run_add(&runtime, args),
        Some(Commands::Update) => run_update(&runtime),
        Some(Commands::Posters(args)) => run_posters(&runtime, args),
        Some(Commands::Embed) => run_embed(&runtime),
        Some(Commands::FixLinks(args)) => run_fix_links(&runtime, args),
        Some(Commands::MigrateGames(args)) => run_migrate_games(&runtime, args),
        Some(Commands::StandardizeGames) => run_standardize_games(&runtime),
        Some(Commands::Classify) => run_classify(&runtime),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Init(args)) => run_init(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run_add(runtime: &RuntimeOptions, args: AddArgs) -> Result<()> {
    let session = open_session(runtime)?;
    let category = Category::parse(&args.media_type)?;
    let credentials = Credentials::from_env();
    credentials.require(category)?;

    let titles = read_titles(io::stdin().lock())?;
    let mut console = StdConsole::new();
    if titles.is_empty() {
        console.say("no titles provided");
        return Ok(());
    }

    let settings = session.http_settings();
    let mut provider = create_provider(category, &credentials, &settings)?;
    let mut fetcher = HttpPosterFetcher::new(settings)?;
    let options = AddOptions {
        category,
        genres: session.config.genre_map(),
        poster_width: (!args.no_posters)
            .then(|| args.poster_width.unwrap_or_else(|| session.config.poster_width())),
        run: session.run.clone(),
    };
    let summary = add_titles(
        &session.paths.vault_root,
        &titles,
        &options,
        provider.as_mut(),
        &mut fetcher,
        &mut console,
    )?;
    finish(runtime, &session, &summary);
    Ok(())
}

fn run_update(runtime: &RuntimeOptions) -> Result<()> {
    let session = open_session(runtime)?;
    let credentials = Credentials::from_env();
    let mut provider = create_screen_provider(&credentials, &session.http_settings())?;
    let options = UpdateOptions {
        rules: session.config.scan_rules(),
        run: session.run.clone(),
    };
    let summary = update_notes(
        &session.paths.vault_root,
        &options,
        provider.as_mut(),
        &mut StdConsole::new(),
    )?;
    finish(runtime, &session, &summary);
    Ok(())
}

fn run_posters(runtime: &RuntimeOptions, args: PostersArgs) -> Result<()> {
    let session = open_session(runtime)?;
    let category = args.category.as_deref().map(Category::parse).transpose()?;
    let settings = session.http_settings();
    let mut source = ProviderCache::new(Credentials::from_env(), settings.clone());
    let mut fetcher = HttpPosterFetcher::new(settings)?;
    let options = PosterOptions {
        category,
        width: args.width.unwrap_or_else(|| session.config.poster_width()),
        rules: session.config.scan_rules(),
        run: session.run.clone(),
    };
    let summary = download_posters(
        &session.paths.vault_root,
        &options,
        &mut source,
        &mut fetcher,
        &mut StdConsole::new(),
    )?;
    finish(runtime, &session, &summary);
    Ok(())
}

fn run_embed(runtime: &RuntimeOptions) -> Result<()> {
    let session = open_session(runtime)?;
    let options = EmbedOptions {
        rules: session.config.scan_rules(),
        run: session.run.clone(),
    };
    let summary = embed_posters(&session.paths.vault_root, &options, &mut StdConsole::new())?;
    finish(runtime, &session, &summary);
    Ok(())
}

fn run_fix_links(runtime: &RuntimeOptions, args: FixLinksArgs) -> Result<()> {
    let session = open_session(runtime)?;
    let options = FixLinksOptions {
        interactive: !args.non_interactive,
        rules: session.config.scan_rules(),
        run: session.run.clone(),
    };
    let mut console = StdConsole::new();
    console.say(&format!(
        "mode: {}",
        if options.interactive {
            "interactive"
        } else {
            "non-interactive"
        }
    ));
    fix_links(&session.paths.vault_root, &options, &mut console)?;
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", session.paths.diagnostics());
    }
    Ok(())
}

fn run_migrate_games(runtime: &RuntimeOptions, args: MigrateGamesArgs) -> Result<()> {
    let session = open_session(runtime)?;
    let mut players = PlayerMapping::default();
    players.extend(&session.config.players);
    for mapping in &args.player_mappings {
        let (tag, names) = parse_mapping_arg(mapping)?;
        debug!(tag = %tag, names = %names, "player mapping");
        players.add_mapping(&tag, &names);
    }
    let options = MigrateOptions {
        players,
        filter_tags: args.filter_tags,
        show_details: !args.no_summary,
        rules: session.config.scan_rules(),
        run: session.run.clone(),
    };
    match migrate_games(&session.paths.vault_root, &options, &mut StdConsole::new())? {
        MigrationRun::Finished(summary) => finish(runtime, &session, &summary),
        MigrationRun::NoNotes | MigrationRun::Cancelled => {}
    }
    Ok(())
}

fn run_standardize_games(runtime: &RuntimeOptions) -> Result<()> {
    let session = open_session(runtime)?;
    let credentials = Credentials::from_env();
    let mut provider = create_provider(Category::Game, &credentials, &session.http_settings())?;
    let options = StandardizeOptions {
        rules: session.config.scan_rules(),
        run: session.run.clone(),
    };
    let summary = standardize_games(
        &session.paths.vault_root,
        &options,
        provider.as_mut(),
        &mut StdConsole::new(),
    )?;
    finish(runtime, &session, &summary);
    Ok(())
}

fn run_classify(runtime: &RuntimeOptions) -> Result<()> {
    let session = open_session(runtime)?;
    let root = &session.paths.vault_root;
    let classified = classify_vault(root, &session.config.scan_rules())?;
    for (path, classification) in &classified {
        let relative = path.strip_prefix(root).unwrap_or(path);
        println!(
            "{}\t{}",
            classification.label(),
            normalize_for_display(relative)
        );
    }
    println!("notes: {}", classified.len());
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", session.paths.diagnostics());
    }
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    println!("runtime status");
    println!("vault_root: {}", normalize_for_display(&paths.vault_root));
    println!("vault_exists: {}", format_flag(status.vault_exists));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!(
        "config: {} ({})",
        normalize_for_display(&paths.config_path),
        if status.config_exists { "found" } else { "missing" }
    );
    println!("backups: {}", status.backup_count);
    let credentials = Credentials::from_env();
    println!(
        "credentials.tmdb: {}",
        format_flag(credentials.tmdb_api_key.is_some())
    );
    println!(
        "credentials.igdb: {}",
        format_flag(credentials.igdb().is_ok())
    );
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;
    println!("Initialized medianotes state");
    println!("vault_root: {}", normalize_for_display(&paths.vault_root));
    println!("state_dir: {}", normalize_for_display(&paths.state_dir));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

/// Resolve paths, check the vault, load config and decide where the backup
/// goes. Live runs always get a backup path.
fn open_session(runtime: &RuntimeOptions) -> Result<Session> {
    let paths = resolve_runtime_paths(runtime)?;
    ensure_vault_exists(&paths)?;
    let config = load_config(&paths.config_path)?;
    let backup = if runtime.dry_run {
        None
    } else {
        Some(match &runtime.backup {
            Some(path) => absolutize(path)?,
            None => default_backup_path(&paths.state_dir, Utc::now()),
        })
    };
    debug!(vault = %paths.vault_root.display(), dry_run = runtime.dry_run, "session opened");
    Ok(Session {
        paths,
        config,
        run: RunOptions {
            dry_run: runtime.dry_run,
            backup,
        },
    })
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}

fn finish(runtime: &RuntimeOptions, session: &Session, summary: &RunSummary) {
    if summary.dry_run {
        println!("\nThis was a dry run. Run without --dry-run to apply changes.");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", session.paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        vault: runtime.vault.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let vault_env = initial.vault_root.join(".env");
    if vault_env.exists() {
        let _ = dotenvy::from_path_override(&vault_env);
    }

    resolve_paths(&context, &overrides)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
