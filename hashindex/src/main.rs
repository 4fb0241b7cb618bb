use hashindex::candidate::{Candidate, sort_ascending};
use hashindex::config::IndexConfig;
use hashindex::search::nearest_keys;
use hashindex::{BTree, NodeLayout};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hashindex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match IndexConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: tree_path={}, block_length={}, num_points={}, top_k={}, seed={}",
        config.tree_path.display(),
        config.block_length,
        config.num_points,
        config.top_k,
        config.seed
    );

    if let Err(e) = run(&config) {
        tracing::error!("Index build failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: &IndexConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = config.tree_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if config.tree_path.exists() {
        tracing::info!("Replacing existing tree file {}", config.tree_path.display());
        std::fs::remove_file(&config.tree_path)?;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let num_points = i32::try_from(config.num_points)?;
    let mut records: Vec<Candidate> = (0..num_points)
        .map(|id| Candidate::new(rng.random_range(-1.0..1.0), id))
        .collect();
    sort_ascending(&mut records);

    let layout = NodeLayout::new(config.block_length)?;
    let mut tree = BTree::create(&config.tree_path, layout)?;
    let summary = tree.bulk_load(&records)?;
    tree.close()?;
    tracing::info!(
        "Built tree: {} entries in {} leaves, height {}",
        summary.num_entries,
        summary.num_leaves,
        summary.height
    );

    let mut tree = BTree::open(&config.tree_path)?;
    let query: f32 = rng.random_range(-1.0..1.0);
    let neighbors = nearest_keys(&mut tree, query, config.top_k)?;

    tracing::info!("{} nearest keys to {query}:", neighbors.len());
    for (rank, neighbor) in neighbors.iter().enumerate() {
        tracing::info!(rank, id = neighbor.id, distance = neighbor.key, "neighbor");
    }

    tree.close()?;
    Ok(())
}
