use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use recipe_finder::config::AppPaths;
use recipe_finder::core::fields::NAME_FIELD;
use recipe_finder::core::settings::KNOWN_KEYS;
use recipe_finder::core::{
    Catalog, CatalogStore, DumpMode, ExifTool, FieldMap, Recipe, Resolution, ResolutionChoice,
    SettingsStore, find_duplicate, find_match_recipe, normalize_white_balance_fine_tune,
    prepare_metadata, relevant_keys, schema,
};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "raf", "nef"];

#[derive(Parser, Debug)]
#[command(
    name = "recipe-finder",
    version,
    about = "Identify and manage film simulation recipes"
)]
struct Cli {
    /// Recipe catalog file (default: <config dir>/recipe-finder/film_simulations.xml)
    #[arg(long, global = true, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Settings file (default: <config dir>/recipe-finder/user_settings.json)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// exiftool program to run instead of searching for one
    #[arg(long, global = true, value_name = "FILE")]
    exiftool: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find the recipe behind one or more photos
    Identify {
        /// Photos or directories to scan
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
        /// Show the full metadata dump for unmatched photos
        #[arg(long)]
        full: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the recipe catalog
    Recipes {
        #[command(subcommand)]
        command: RecipesCmd,
    },

    /// Show a photo's metadata
    Exif {
        /// Photo to inspect
        #[arg(value_name = "PHOTO")]
        photo: PathBuf,
        /// Every tag instead of the film simulation summary
        #[arg(long)]
        full: bool,
    },

    /// Convert a raw WhiteBalanceFineTune value to catalog units
    Normalize {
        /// Value as reported by the camera, e.g. "Red +60, Blue -100"
        value: String,
    },

    /// View or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCmd,
    },
}

#[derive(Subcommand, Debug)]
enum RecipesCmd {
    /// List recipes for the active sensors
    List {
        /// Only recipes whose name or settings contain this text
        #[arg(short, long)]
        search: Option<String>,
        /// Ignore the active sensor filter
        #[arg(long)]
        all_sensors: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one recipe
    Show {
        name: String,
        /// Print the recipe as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count recipes per sensor
    Stats,

    /// List recipe fields with their defaults and allowed values
    Fields,

    /// Add a recipe
    Add {
        /// Recipe name
        #[arg(short, long)]
        name: String,
        /// Pre-fill settings from a photo
        #[arg(long, value_name = "PHOTO")]
        from_picture: Option<PathBuf>,
        /// Set a field, e.g. --set "FilmMode=Classic Chrome"
        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
        /// What to do when the name or settings already exist
        #[arg(long, value_enum, conflicts_with = "rename")]
        on_conflict: Option<ConflictPolicy>,
        /// Store under this name when the recipe collides
        #[arg(long, value_name = "NAME")]
        rename: Option<String>,
    },

    /// Change fields of a stored recipe
    Edit {
        name: String,
        /// Set a field, e.g. --set "Clarity=-2"
        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
        /// Remove a field
        #[arg(long, value_name = "FIELD")]
        unset: Vec<String>,
    },

    /// Delete a recipe
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Convert stored WhiteBalanceFineTune values from raw camera units
    MigrateWbft {
        /// Only show what would change
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCmd {
    /// Print every setting
    Show,
    /// Change one setting
    Set { key: String, value: String },
    /// Switch between the dark and light theme
    ToggleTheme,
    /// Restore the defaults
    Reset,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConflictPolicy {
    Overwrite,
    KeepBoth,
    Cancel,
}

impl ConflictPolicy {
    fn choice(self) -> ResolutionChoice {
        match self {
            ConflictPolicy::Overwrite => ResolutionChoice::Overwrite,
            ConflictPolicy::KeepBoth => ResolutionChoice::KeepBoth,
            ConflictPolicy::Cancel => ResolutionChoice::Cancel,
        }
    }
}

/// Stores and collaborators shared by every command.
struct Context {
    catalog: CatalogStore,
    settings: SettingsStore,
    exiftool: Option<PathBuf>,
}

impl Context {
    fn exiftool(&self) -> Result<ExifTool> {
        match &self.exiftool {
            Some(program) => Ok(ExifTool::at(program)),
            None => ExifTool::locate().context("Install exiftool or pass --exiftool"),
        }
    }
}

#[derive(Serialize, Debug)]
struct IdentifyRecord {
    photo: String,
    recipe: Option<String>,
    fields: FieldMap,
    error: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = AppPaths::resolve(cli.catalog, cli.settings);
    if let Err(e) = paths.ensure_parent_dirs() {
        log::warn!("Could not create config directory: {}", e);
    }
    let ctx = Context {
        catalog: CatalogStore::new(&paths.catalog),
        settings: SettingsStore::new(&paths.settings),
        exiftool: cli.exiftool,
    };

    match cli.command {
        Commands::Identify { paths, full, json } => identify(&ctx, &paths, full, json)?,

        Commands::Recipes { command } => match command {
            RecipesCmd::List {
                search,
                all_sensors,
                json,
            } => list_recipes(&ctx, search.as_deref(), all_sensors, json)?,
            RecipesCmd::Show { name, json } => {
                let catalog = load_catalog(&ctx)?;
                let recipe = catalog
                    .get(&name)
                    .with_context(|| format!("Recipe '{}' not found", name))?;
                if json {
                    println!("{}", serde_json::to_string_pretty(recipe)?);
                } else {
                    println!("▶ {}", name);
                    print_fields(recipe, true);
                }
            }
            RecipesCmd::Stats => {
                let catalog = load_catalog(&ctx)?;
                let counts = catalog.sensor_counts();
                println!("🗂️  {} recipe(s) in {}", catalog.len(), ctx.catalog.path().display());
                if !counts.is_empty() {
                    let summary: Vec<String> = counts
                        .iter()
                        .map(|(sensor, count)| format!("{} ({})", sensor, count))
                        .collect();
                    println!("   Recipes: {}", summary.join(", "));
                }
            }
            RecipesCmd::Fields => {
                for field in schema::fields() {
                    let default = if field.default_value.is_empty() {
                        "(empty)"
                    } else {
                        field.default_value
                    };
                    println!("{:<24} default: {}", field.name, default);
                    if !field.allowed_values.is_empty() {
                        println!("{:<24} allowed: {}", "", field.allowed_values.join(" | "));
                    }
                }
            }
            RecipesCmd::Add {
                name,
                from_picture,
                assignments,
                on_conflict,
                rename,
            } => add_recipe(
                &ctx,
                &name,
                from_picture.as_deref(),
                &assignments,
                on_conflict,
                rename,
            )?,
            RecipesCmd::Edit {
                name,
                assignments,
                unset,
            } => edit_recipe(&ctx, &name, &assignments, &unset)?,
            RecipesCmd::Delete { name, yes } => delete_recipe(&ctx, &name, yes)?,
            RecipesCmd::MigrateWbft { dry_run } => {
                let changes = ctx
                    .catalog
                    .migrate_white_balance_units(dry_run)
                    .context("Failed to convert catalog")?;
                for change in &changes {
                    println!("   {}: {} → {}", change.name, change.before, change.after);
                }
                if dry_run {
                    println!("\n⚠️  Dry-run only; {} profile(s) would change.", changes.len());
                } else {
                    println!("\n✅ Converted {} profile(s).", changes.len());
                }
            }
        },

        Commands::Exif { photo, full } => {
            let mode = if full { DumpMode::Full } else { DumpMode::Short };
            let metadata = ctx
                .exiftool()?
                .extract_dump(&photo, mode)
                .with_context(|| format!("Failed to read metadata of {}", photo.display()))?;
            print_fields(&metadata, false);
        }

        Commands::Normalize { value } => {
            println!("{}", normalize_white_balance_fine_tune(&value));
        }

        Commands::Settings { command } => settings_command(&ctx, command)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn load_catalog(ctx: &Context) -> Result<Catalog> {
    ctx.catalog.load().with_context(|| {
        format!(
            "Failed to load recipe catalog {}",
            ctx.catalog.path().display()
        )
    })
}

/// Match every photo under `paths` against the catalog.
fn identify(ctx: &Context, paths: &[PathBuf], full: bool, json: bool) -> Result<()> {
    let photos = collect_photos(paths)?;
    if photos.is_empty() {
        bail!(
            "No photos found (supported: {})",
            PHOTO_EXTENSIONS.join(", ")
        );
    }

    let catalog = load_catalog(ctx)?;
    let tool = ctx.exiftool()?;
    remember_last_dir(ctx, &photos[0]);

    let keys = relevant_keys(&catalog);
    let progress = ProgressBar::new(photos.len() as u64);
    progress.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{bar:30}] {pos}/{len} {msg}",
    )?);
    progress.set_message("Reading metadata…");
    progress.enable_steady_tick(Duration::from_millis(100));

    let extracted: Vec<_> = benchmark("reading metadata", || {
        photos
            .par_iter()
            .map(|photo| {
                let result = tool.extract_relevant(photo, &keys);
                progress.inc(1);
                result
            })
            .collect()
    });
    progress.finish_and_clear();

    let mode = if full { DumpMode::Full } else { DumpMode::Short };
    let mut records = Vec::with_capacity(photos.len());
    for (photo, result) in photos.iter().zip(extracted) {
        let record = match result {
            Ok(mut metadata) => {
                prepare_metadata(&mut metadata);
                match find_match_recipe(&metadata, &catalog) {
                    Some(matched) => IdentifyRecord {
                        photo: photo.display().to_string(),
                        recipe: matched.name().map(str::to_string),
                        fields: matched.clone(),
                        error: None,
                    },
                    None => match tool.extract_dump(photo, mode) {
                        Ok(dump) => IdentifyRecord {
                            photo: photo.display().to_string(),
                            recipe: None,
                            fields: dump,
                            error: None,
                        },
                        Err(e) => failed_record(photo, e.to_string()),
                    },
                }
            }
            Err(e) => failed_record(photo, e.to_string()),
        };
        records.push(record);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    for record in &records {
        println!("\n✨ {}", record.photo);
        match (&record.recipe, &record.error) {
            (_, Some(error)) => println!("   ⚠️  Failed: {}", error),
            (Some(name), None) => {
                println!("   🏆 Recipe → {}", name);
                print_fields(&record.fields, true);
            }
            (None, None) => {
                println!("   ❔ No matching recipe");
                print_fields(&record.fields, false);
            }
        }
    }

    let matched = records.iter().filter(|r| r.recipe.is_some()).count();
    let failed = records.iter().filter(|r| r.error.is_some()).count();
    println!(
        "\n✅ Identified {} of {} photo(s){}",
        matched,
        records.len(),
        if failed > 0 {
            format!(", {} failed", failed)
        } else {
            String::new()
        }
    );
    Ok(())
}

fn failed_record(photo: &Path, error: String) -> IdentifyRecord {
    IdentifyRecord {
        photo: photo.display().to_string(),
        recipe: None,
        fields: FieldMap::new(),
        error: Some(error),
    }
}

/// Files are taken as given; directories are walked for photo extensions.
fn collect_photos(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for photos…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut photos = Vec::new();
    for path in paths {
        if path.is_file() {
            photos.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_file() && is_photo(entry.path()) {
                    photos.push(entry.path().to_path_buf());
                }
                spinner.tick();
            }
        } else {
            eprintln!("⚠️  {} does not exist; skipping", path.display());
        }
    }
    spinner.finish_and_clear();
    Ok(photos)
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PHOTO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn remember_last_dir(ctx: &Context, photo: &Path) {
    let Some(dir) = photo.parent() else {
        return;
    };
    let mut settings = ctx.settings.load();
    settings.last_dir = dir.display().to_string();
    if let Err(e) = ctx.settings.save(&settings) {
        log::warn!("Error saving settings: {}", e);
    }
}

fn list_recipes(ctx: &Context, search: Option<&str>, all_sensors: bool, json: bool) -> Result<()> {
    let catalog = load_catalog(ctx)?;
    let settings = ctx.settings.load();

    let found = catalog.search(search.unwrap_or_default());
    let visible: Vec<&Recipe> = if all_sensors {
        found
    } else {
        found
            .into_iter()
            .filter(|r| {
                let sensor = r.get("Sensor").unwrap_or_default();
                settings.active_sensors.iter().any(|s| s == sensor)
            })
            .collect()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&visible)?);
        return Ok(());
    }

    let label = if all_sensors {
        "All sensors".to_string()
    } else {
        settings.sensor_filter_label()
    };
    println!("  Showing: {}  ({} recipes)\n", label, visible.len());
    for recipe in visible {
        println!("▶ {}", recipe.name().unwrap_or("?"));
        print_fields(recipe, true);
        println!();
    }
    Ok(())
}

fn add_recipe(
    ctx: &Context,
    name: &str,
    from_picture: Option<&Path>,
    assignments: &[(String, String)],
    on_conflict: Option<ConflictPolicy>,
    rename: Option<String>,
) -> Result<()> {
    let mut recipe = schema::default_recipe();
    if let Some(photo) = from_picture {
        let picked = ctx
            .exiftool()?
            .recipe_from_picture(photo)
            .with_context(|| format!("Failed to extract EXIF from {}", photo.display()))?;
        recipe.extend_from(&picked);
    }
    for (field, value) in assignments {
        if field == NAME_FIELD {
            bail!("Use --name to set the recipe name");
        }
        apply_field(&mut recipe, field, value);
    }
    recipe.insert(NAME_FIELD, name);
    schema::finalize_form(&mut recipe);
    let Some(name) = recipe.name().map(str::to_string) else {
        bail!("Recipe name is required!");
    };

    ctx.catalog.init().context("Failed to create recipe catalog")?;
    let catalog = load_catalog(ctx)?;
    let outcome = find_duplicate(&recipe, &catalog);

    if !outcome.is_conflict() {
        ctx.catalog
            .add(&recipe)
            .with_context(|| format!("Failed to add recipe '{}'", name))?;
        println!("✅ Recipe '{}' added!", name);
        return Ok(());
    }

    let message = outcome.describe(&name);
    let resolution = match (rename, on_conflict) {
        (Some(new_name), _) => Resolution::Rename(new_name),
        (None, Some(policy)) => {
            if !outcome.choices().contains(&policy.choice()) {
                bail!(
                    "{} '{}' is not available here",
                    message,
                    policy.choice().label()
                );
            }
            match policy {
                ConflictPolicy::Overwrite => Resolution::Overwrite,
                ConflictPolicy::KeepBoth => Resolution::KeepBoth,
                ConflictPolicy::Cancel => Resolution::Cancel,
            }
        }
        (None, None) => prompt_resolution(&message, outcome.choices(), &name, &catalog)?,
    };

    match ctx
        .catalog
        .save_candidate(&recipe, resolution.clone())
        .with_context(|| format!("Failed to save recipe '{}'", name))?
    {
        Some(saved) if resolution == Resolution::Overwrite => {
            println!("✅ Recipe '{}' updated!", saved)
        }
        Some(saved) => println!("✅ Recipe '{}' added!", saved),
        None => println!("Cancelled; catalog unchanged."),
    }
    Ok(())
}

fn prompt_resolution(
    message: &str,
    choices: &[ResolutionChoice],
    name: &str,
    catalog: &Catalog,
) -> Result<Resolution> {
    if !std::io::stdin().is_terminal() {
        bail!("{} Use --on-conflict or --rename to resolve it.", message);
    }

    let labels: Vec<&str> = choices.iter().map(|c| c.label()).collect();
    let picked = Select::new()
        .with_prompt(message)
        .items(&labels)
        .default(0)
        .interact_opt()?;

    let resolution = match picked.map(|i| choices[i]) {
        Some(ResolutionChoice::Overwrite) => Resolution::Overwrite,
        Some(ResolutionChoice::KeepBoth) => Resolution::KeepBoth,
        Some(ResolutionChoice::NewName) => {
            let new_name: String = Input::new()
                .with_prompt("Enter new recipe name")
                .with_initial_text(name)
                .validate_with(|input: &String| -> Result<(), String> {
                    let input = input.trim();
                    if input.is_empty() {
                        Err("Name cannot be empty!".to_string())
                    } else if catalog.contains(input) {
                        Err("Name already exists!".to_string())
                    } else {
                        Ok(())
                    }
                })
                .interact_text()?;
            Resolution::Rename(new_name)
        }
        Some(ResolutionChoice::Cancel) | None => Resolution::Cancel,
    };
    Ok(resolution)
}

fn edit_recipe(
    ctx: &Context,
    name: &str,
    assignments: &[(String, String)],
    unset: &[String],
) -> Result<()> {
    let catalog = load_catalog(ctx)?;
    let mut recipe = catalog
        .get(name)
        .cloned()
        .with_context(|| format!("Recipe '{}' not found!", name))?;

    for field in unset {
        if field == NAME_FIELD {
            bail!("The recipe name cannot be changed");
        }
        if recipe.remove(field).is_none() {
            eprintln!("⚠️  '{}' is not set on '{}'", field, name);
        }
    }
    for (field, value) in assignments {
        if field == NAME_FIELD {
            bail!("The recipe name cannot be changed");
        }
        apply_field(&mut recipe, field, value);
    }
    schema::finalize_form(&mut recipe);

    ctx.catalog
        .update(&recipe)
        .with_context(|| format!("Failed to update recipe '{}'", name))?;
    println!("✅ Recipe '{}' updated!", name);
    Ok(())
}

fn delete_recipe(ctx: &Context, name: &str, yes: bool) -> Result<()> {
    let catalog = load_catalog(ctx)?;
    if !catalog.contains(name) {
        bail!("Recipe '{}' not found!", name);
    }

    if !yes {
        if !std::io::stdin().is_terminal() {
            bail!("Refusing to delete '{}' without confirmation; pass --yes", name);
        }
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to delete '{}'? This cannot be undone!",
                name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled; catalog unchanged.");
            return Ok(());
        }
    }

    ctx.catalog
        .delete(name)
        .with_context(|| format!("Failed to delete recipe '{}'", name))?;
    println!("🗑️  Recipe '{}' deleted!", name);
    Ok(())
}

fn settings_command(ctx: &Context, command: SettingsCmd) -> Result<()> {
    let mut settings = ctx.settings.load();
    match command {
        SettingsCmd::Show => {
            println!("🗂️  Settings ({})", ctx.settings.path().display());
            for key in KNOWN_KEYS {
                println!("   {:<16} {}", key, settings.get(key)?);
            }
            for (key, value) in &settings.extra {
                println!("   {:<16} {}", key, value);
            }
            return Ok(());
        }
        SettingsCmd::Set { key, value } => {
            settings.set(&key, &value)?;
            println!("✅ {} = {}", key, settings.get(&key)?);
        }
        SettingsCmd::ToggleTheme => {
            settings.toggle_theme();
            println!("✅ theme = {}", settings.theme);
        }
        SettingsCmd::Reset => {
            let extra = std::mem::take(&mut settings.extra);
            settings = recipe_finder::core::Settings {
                extra,
                ..Default::default()
            };
            println!("✅ Settings restored to defaults");
        }
    }
    ctx.settings
        .save(&settings)
        .with_context(|| format!("Failed to save {}", ctx.settings.path().display()))
}

/// Set `field` on a recipe being edited, warning about names or values the
/// schema does not know.
fn apply_field(recipe: &mut Recipe, field: &str, value: &str) {
    match schema::field(field) {
        None => eprintln!("⚠️  '{}' is not a known recipe field; storing it as-is", field),
        Some(def) if !value.trim().is_empty() && !def.accepts(value.trim()) => eprintln!(
            "⚠️  '{}' is not a listed value for {}",
            value.trim(),
            field
        ),
        Some(_) => {}
    }
    recipe.insert(field, value);
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", raw))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", raw));
    }
    Ok((field.to_string(), value.to_string()))
}

fn print_fields(fields: &FieldMap, skip_name: bool) {
    for (key, value) in fields.iter() {
        if skip_name && key == NAME_FIELD {
            continue;
        }
        println!("      {}: {}", key, value);
    }
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
