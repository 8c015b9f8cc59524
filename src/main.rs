use clap::{Parser, Subcommand};
use lineup_kit::catalog::{Catalog, DirCatalog, PostFilter, filter_posts};
use lineup_kit::draft::{CandidateFile, Draft};
use lineup_kit::imaging::RustBackend;
use lineup_kit::package::ZipPackageWriter;
use lineup_kit::types::{Method, Side, Site, Utility};
use lineup_kit::workflow::{AuthoringSession, Collaborators, SessionSettings, SubmitError};
use lineup_kit::{config, import, output};
use std::path::{Path, PathBuf};

/// Tag and method flags shared by `create` and `edit`.
#[derive(clap::Args, Clone, Default)]
struct FieldArgs {
    /// Post title (trimmed and capped to the configured length)
    #[arg(long)]
    title: Option<String>,

    /// Throw method, repeatable (CROUCH, JUMP, THROW, DOUBLE, WALK, RUN, "W TAP")
    #[arg(long = "method")]
    methods: Vec<Method>,

    /// Team side (CT or T)
    #[arg(long)]
    side: Option<Side>,

    /// Site label (A, B, MID, ...)
    #[arg(long)]
    site: Option<Site>,

    /// Utility (SMOKE, MOLO, FLASH, NADE)
    #[arg(long)]
    utility: Option<Utility>,
}

#[derive(Parser)]
#[command(name = "lineup-kit")]
#[command(about = "Author and package utility lineup posts")]
#[command(long_about = "\
Author and package utility lineup posts

A post is a titled, tagged set of up to four screenshots showing how to throw
a piece of utility on a map. Submitting a post normalizes every image to AVIF
with a bounded longest side and bundles them with a post.json manifest into
one ZIP archive.

Catalog structure:

  catalog/
  ├── config.toml            # Optional overrides (see gen-config)
  ├── posts/
  │   └── de_mirage.json     # JSON array of posts
  └── assets/
      ├── maps/
      │   └── de_mirage.png  # One image per map; the stem is the map id
      └── posts/
          └── de_mirage/…    # Images referenced by posts

Run 'lineup-kit gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Catalog directory
    #[arg(long, default_value = "catalog", global = true)]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the catalog's maps with their post counts
    Maps,
    /// List posts, optionally filtered
    List {
        /// Only posts on this map id
        #[arg(long)]
        map: Option<String>,
        #[arg(long)]
        side: Option<Side>,
        #[arg(long)]
        site: Option<Site>,
        /// Any of these utilities, repeatable
        #[arg(long = "utility")]
        utilities: Vec<Utility>,
    },
    /// Author a new post and write its archive
    Create {
        /// Map id (e.g. de_mirage)
        #[arg(long)]
        map: String,
        #[command(flatten)]
        fields: FieldArgs,
        /// Image file, repeatable, in display order
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Directory the archive is written to
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Edit a catalog post and write its archive
    Edit {
        post_id: String,
        #[command(flatten)]
        fields: FieldArgs,
        /// Remove the image at this 1-based position, repeatable
        #[arg(long = "remove")]
        remove: Vec<usize>,
        /// Move an image, FROM:TO (1-based), repeatable
        #[arg(long = "move", value_parser = parse_move)]
        moves: Vec<(usize, usize)>,
        /// Append an image file, repeatable
        #[arg(long = "add")]
        add: Vec<PathBuf>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Re-import an exported archive and write it back out
    Import {
        archive: PathBuf,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let app_config = config::load_config(&cli.catalog)?;
    let catalog = DirCatalog::open(&cli.catalog)?;

    match cli.command {
        Command::Maps => {
            output::print_maps(catalog.list_maps(), catalog.list_posts());
        }
        Command::List {
            map,
            side,
            site,
            utilities,
        } => {
            let filter = PostFilter {
                map_id: map,
                side,
                site,
                utilities,
            };
            output::print_posts(&filter_posts(catalog.list_posts(), &filter));
        }
        Command::Create {
            map,
            fields,
            images,
            out,
        } => {
            init_thread_pool(&app_config.processing);
            let backend = RustBackend::new();
            let writer = ZipPackageWriter::new();
            let services = Collaborators {
                backend: &backend,
                catalog: &catalog,
                writer: &writer,
            };
            let session = AuthoringSession::create(services, SessionSettings::from_config(&app_config));
            let candidates = read_candidates(&images)?;
            session.edit_draft(|draft| {
                draft.set_map(Some(map));
                apply_fields(draft, fields);
                let added = draft.add_images(candidates);
                if let Some(notice) = output::format_add_outcome(added, draft.limits().max_images) {
                    println!("{}", notice);
                }
            })?;
            submit_and_write(session, &out)?;
        }
        Command::Edit {
            post_id,
            fields,
            remove,
            moves,
            add,
            out,
        } => {
            let post = catalog
                .find_post(&post_id)
                .ok_or_else(|| format!("no post with id {post_id:?}"))?
                .clone();
            init_thread_pool(&app_config.processing);
            let backend = RustBackend::new();
            let writer = ZipPackageWriter::new();
            let services = Collaborators {
                backend: &backend,
                catalog: &catalog,
                writer: &writer,
            };
            let (session, notices) =
                AuthoringSession::edit(services, SessionSettings::from_config(&app_config), &post);
            for notice in notices {
                println!("Note: {}", notice);
            }
            let candidates = read_candidates(&add)?;
            session.edit_draft(|draft| -> Result<(), String> {
                apply_fields(draft, fields);
                let mut remove = remove;
                remove.sort_unstable_by(|a, b| b.cmp(a));
                remove.dedup();
                for pos in remove {
                    if pos == 0 || !draft.remove_image(pos - 1) {
                        return Err(format!("no image at position {pos}"));
                    }
                }
                for (from, to) in moves {
                    if from == 0 || to == 0 || !draft.reorder_image(from - 1, to - 1) {
                        return Err(format!("cannot move image {from} to {to}"));
                    }
                }
                let added = draft.add_images(candidates);
                if let Some(notice) = output::format_add_outcome(added, draft.limits().max_images) {
                    println!("{}", notice);
                }
                Ok(())
            })??;
            submit_and_write(session, &out)?;
        }
        Command::Import { archive, out } => {
            init_thread_pool(&app_config.processing);
            let settings = SessionSettings::from_config(&app_config);
            let bytes = std::fs::read(&archive)?;
            let imported = import::import_archive(&bytes, &settings.layout)?;
            let backend = RustBackend::new();
            let writer = ZipPackageWriter::new();
            let services = Collaborators {
                backend: &backend,
                catalog: &catalog,
                writer: &writer,
            };
            let (session, added, notices) = AuthoringSession::import(services, settings, imported);
            for notice in notices {
                println!("Note: {}", notice);
            }
            let max_images = app_config.posts.max_images;
            if let Some(notice) = output::format_add_outcome(added, max_images) {
                println!("{}", notice);
            }
            submit_and_write(session, &out)?;
        }
        // Printed before the catalog is opened.
        Command::GenConfig => {}
    }

    Ok(())
}

/// Show the draft, submit it with live progress, and write the archive.
fn submit_and_write(session: AuthoringSession<'_>, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    session.read(output::print_draft);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_submit_event(&event) {
                println!("{}", line);
            }
        }
    });
    let session = session.with_progress(tx);
    let result = session.submit();
    // Dropping the session closes the channel so the printer can finish.
    drop(session);
    printer.join().map_err(|_| "progress printer panicked")?;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(SubmitError::EmptyImageSet { warnings }) => {
            for warning in &warnings {
                println!("Warning: {}", warning);
            }
            return Err(SubmitError::EmptyImageSet { warnings }.into());
        }
        Err(err) => return Err(err.into()),
    };

    std::fs::create_dir_all(out)?;
    let path = out.join(&outcome.file_name);
    std::fs::write(&path, &outcome.package)?;
    output::print_submit_outcome(&outcome, &path.display().to_string());
    Ok(())
}

fn apply_fields(draft: &mut Draft, fields: FieldArgs) {
    if let Some(title) = fields.title {
        draft.set_title(&title);
    }
    if !fields.methods.is_empty() {
        draft.set_methods(fields.methods);
    }
    if fields.side.is_some() {
        draft.set_side(fields.side);
    }
    if fields.site.is_some() {
        draft.set_site(fields.site);
    }
    if fields.utility.is_some() {
        draft.set_utility(fields.utility);
    }
}

fn read_candidates(paths: &[PathBuf]) -> std::io::Result<Vec<CandidateFile>> {
    paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(CandidateFile::from_name(name, std::fs::read(path)?))
        })
        .collect()
}

fn parse_move(value: &str) -> Result<(usize, usize), String> {
    let (from, to) = value
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got {value:?}"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<usize>()
            .map_err(|_| format!("invalid position {s:?}"))
    };
    Ok((parse(from)?, parse(to)?))
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
