use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use reelsim::catalog::{self, ItemId, ItemMetadata, ItemSummary, MetadataPatch, UserId};
use reelsim::catalog::{embedding, items, likes};
use reelsim::config::{Config, EmbedBackend};
use reelsim::embed::{self, Embedder};
use reelsim::recommend::{Outcome, RecommendRequest, Recommender};
use reelsim::store::sqlite::Store;

#[derive(Parser)]
#[command(
    name = "reelsim",
    version,
    about = "Embedding-based recommendations over a local catalog"
)]
struct Cli {
    /// Project root holding the .reelsim directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the catalog database
    Init,
    /// Add an item to the catalog and embed it
    Add(AddArgs),
    /// Change an item's metadata (the stored vector is kept)
    Update(UpdateArgs),
    /// Show everything stored about an item
    Show { id: ItemId },
    /// List items by title
    List,
    /// Delete an item and the likes pointing at it
    Remove { id: ItemId },
    /// Embed items that have no vector yet
    Embed {
        /// Also recompute vectors whose metadata changed since embedding
        #[arg(long)]
        stale: bool,
    },
    /// Show catalog and embedding statistics
    Status,
    /// Record that a user likes an item
    Like { user: UserId, item: ItemId },
    /// Remove a like
    Unlike { user: UserId, item: ItemId },
    /// List the items a user likes
    Likes { user: UserId },
    /// Replace a user's likes with exactly these items
    SetLikes { user: UserId, items: Vec<ItemId> },
    /// Recommend items similar to a liked set
    Recommend {
        /// Liked item ids
        ids: Vec<String>,
        /// Use this user's stored likes instead of ids
        #[arg(long, conflicts_with = "ids")]
        user: Option<UserId>,
        /// content, latest, popularity, user_based or hybrid
        #[arg(long, short, default_value = "content")]
        strategy: String,
        /// Number of results (1-100, default from config)
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
}

#[derive(Args)]
struct AddArgs {
    /// Read the item metadata from a JSON file instead of flags
    #[arg(long, conflicts_with_all = ["title", "description"])]
    file: Option<PathBuf>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long = "genre")]
    genres: Vec<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    year: Option<i32>,
    #[arg(long)]
    director: Option<String>,
    #[arg(long = "actor")]
    actors: Vec<String>,
}

#[derive(Args)]
struct UpdateArgs {
    id: ItemId,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Replaces the genre list
    #[arg(long = "genre")]
    genres: Vec<String>,
    /// Replaces the tag list
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    year: Option<i32>,
    #[arg(long)]
    director: Option<String>,
    /// Replaces the actor list
    #[arg(long = "actor")]
    actors: Vec<String>,
}

impl AddArgs {
    fn into_metadata(self) -> Result<ItemMetadata> {
        if let Some(path) = self.file {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            return serde_json::from_str(&contents)
                .with_context(|| format!("parsing item from {}", path.display()));
        }
        let Some(title) = self.title else {
            bail!("--title is required (or pass --file)");
        };
        Ok(ItemMetadata {
            title,
            description: self.description,
            genres: self.genres,
            tags: self.tags,
            release_year: self.year,
            director: self.director,
            actors: self.actors,
        })
    }
}

impl UpdateArgs {
    fn into_patch(self) -> (ItemId, MetadataPatch) {
        let non_empty = |v: Vec<String>| (!v.is_empty()).then_some(v);
        let patch = MetadataPatch {
            title: self.title,
            description: self.description,
            genres: non_empty(self.genres),
            tags: non_empty(self.tags),
            release_year: self.year,
            director: self.director,
            actors: non_empty(self.actors),
        };
        (self.id, patch)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reelsim=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = cli.root.as_path();
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            let config = Config::load(root)?;
            let path = config.save(root)?;
            catalog::open_store(root, &config)?;
            println!("Wrote {}", path.display());
            if let Some(note) = backend_note(&config.embed.backend) {
                println!("{note}");
            }
        }
        Commands::Add(args) => {
            let config = Config::load(root)?;
            let embedder = require_embedder(&config)?;
            let store = catalog::open_store(root, &config)?;
            let id = items::add(&store, embedder.as_ref(), &args.into_metadata()?)?;
            if json {
                print_json(&serde_json::json!({ "id": id }))?;
            } else {
                println!("{id}");
            }
        }
        Commands::Update(args) => {
            let store = existing_store(root)?;
            let (id, patch) = args.into_patch();
            let item = items::update(&store, id, patch)?;
            if json {
                print_json(&item)?;
            } else {
                println!("Updated {} ({})", item.id, item.metadata.title);
            }
        }
        Commands::Show { id } => {
            let store = existing_store(root)?;
            let item = items::show(&store, id)?;
            if json {
                print_json(&item)?;
            } else {
                print_item(&item);
            }
        }
        Commands::List => {
            let store = existing_store(root)?;
            print_summaries(&items::list(&store)?, json)?;
        }
        Commands::Remove { id } => {
            let store = existing_store(root)?;
            items::remove(&store, id)?;
            if !json {
                println!("Removed {id}");
            }
        }
        Commands::Embed { stale } => {
            let config = Config::load(root)?;
            let embedder = require_embedder(&config)?;
            let store = existing_store(root)?;
            let stats = embedding::embed_pending(&store, embedder.as_ref(), stale)?;
            if json {
                print_json(&stats)?;
            } else {
                println!(
                    "Embedded {} new, refreshed {}, failed {} ({} items total)",
                    stats.newly_embedded, stats.refreshed, stats.failed, stats.total_items
                );
            }
        }
        Commands::Status => {
            let store = existing_store(root)?;
            let status = embedding::status(&store)?;
            if json {
                print_json(&status)?;
            } else {
                println!("Items:        {}", status.items);
                println!("Embedded:     {}", status.embedded);
                println!("Unembedded:   {}", status.unembedded);
                println!("Stale:        {}", status.stale);
                match status.dimensions {
                    Some(d) => println!("Dimensions:   {d}"),
                    None => println!("Dimensions:   -"),
                }
                for (model, count) in &status.models {
                    println!("  {model}: {count}");
                }
                println!("Likes:        {}", status.interactions);
                println!("Users:        {}", status.users);
            }
        }
        Commands::Like { user, item } => {
            likes::like(&existing_store(root)?, user, item)?;
        }
        Commands::Unlike { user, item } => {
            likes::unlike(&existing_store(root)?, user, item)?;
        }
        Commands::Likes { user } => {
            let liked = likes::list(&existing_store(root)?, user)?;
            if json {
                print_json(&liked)?;
            } else {
                for id in liked {
                    println!("{id}");
                }
            }
        }
        Commands::SetLikes { user, items } => {
            likes::replace(&existing_store(root)?, user, &items)?;
        }
        Commands::Recommend {
            ids,
            user,
            strategy,
            limit,
        } => {
            let config = Config::load(root)?;
            let store = existing_store(root)?;
            let limit = limit.unwrap_or(config.recommend.default_limit);

            let request = match user {
                Some(user) if ids.is_empty() => {
                    let liked = likes::list(&store, user)?;
                    RecommendRequest::new(liked, limit, strategy.parse()?)?
                }
                _ => RecommendRequest::parse(&ids, limit, &strategy)?,
            };
            let outcome = Recommender::new(&store, &store).recommend(&request)?;
            print_outcome(&outcome, json)?;
        }
    }
    Ok(())
}

fn backend_note(backend: &EmbedBackend) -> Option<String> {
    match backend {
        EmbedBackend::Hashing { dimensions } => Some(format!(
            "Embedding with the offline hashing backend ({dimensions} dims). \
             For a pretrained model set [embed] backend to ollama with all-minilm."
        )),
        EmbedBackend::None => Some("Embedding is disabled; `add` and `embed` will fail.".into()),
        EmbedBackend::Ollama { .. } => None,
    }
}

fn require_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    match embed::from_config(&config.embed)? {
        Some(embedder) => Ok(embedder),
        None => bail!("embedding backend is `none`; set [embed] backend in .reelsim/config.toml"),
    }
}

fn existing_store(root: &Path) -> Result<Store> {
    let config = Config::load(root)?;
    let root = root
        .canonicalize()
        .with_context(|| format!("resolving path {}", root.display()))?;
    let storage_dir = config.storage_dir(&root);
    match Store::open_if_exists(&storage_dir)? {
        Some(store) => Ok(store),
        None => bail!(
            "no catalog at {} (run `reelsim init` first)",
            storage_dir.display()
        ),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summaries(summaries: &[ItemSummary], json: bool) -> Result<()> {
    if json {
        return print_json(&summaries);
    }
    for s in summaries {
        match s.release_year {
            Some(year) => println!("{}  {} ({year})", s.id, s.title),
            None => println!("{}  {}", s.id, s.title),
        }
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }
    match outcome {
        Outcome::NoData(reason) => println!("{}", reason.reason()),
        Outcome::Ranked(ranked) if ranked.is_empty() => println!("No recommendations."),
        Outcome::Ranked(ranked) => {
            for (rank, s) in ranked.iter().enumerate() {
                match s.release_year {
                    Some(year) => println!("{:>3}. {} ({year})  {}", rank + 1, s.title, s.id),
                    None => println!("{:>3}. {}  {}", rank + 1, s.title, s.id),
                }
            }
        }
    }
    Ok(())
}

fn print_item(item: &catalog::Item) {
    let meta = &item.metadata;
    println!("{}", meta.title);
    println!("  id:          {}", item.id);
    if let Some(year) = meta.release_year {
        println!("  year:        {year}");
    }
    if let Some(description) = &meta.description {
        println!("  description: {description}");
    }
    let lists = [
        ("genres", &meta.genres),
        ("tags", &meta.tags),
        ("actors", &meta.actors),
    ];
    for (label, values) in lists {
        if !values.is_empty() {
            println!("  {:<12} {}", format!("{label}:"), values.join(", "));
        }
    }
    if let Some(director) = &meta.director {
        println!("  director:    {director}");
    }
    match (&item.embedded_model, &item.embedded_at) {
        (Some(model), Some(at)) => println!("  embedded:    {model} at {at}"),
        _ => println!("  embedded:    no"),
    }
}
