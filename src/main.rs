//! us3-adapter command line entry point

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use us3_adapter::config::Config;
use us3_adapter::types::{
    DeleteOptions, ListMode, ListOptions, Object, ReadOptions, StatOptions, WriteOptions,
};
use us3_adapter::Storage;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: us3-adapter <config.yaml> <storage> <command> <path> [file]");
    eprintln!();
    eprintln!("us3-adapter - object storage operations over UCloud US3");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  ls <path>           List one directory level");
    eprintln!("  find <path>         List every object under a prefix");
    eprintln!("  stat <path>         Show object attributes");
    eprintln!("  get <path> [file]   Download to a file, or stdout");
    eprintln!("  put <path> <file>   Upload a local file");
    eprintln!("  rm <path>           Delete an object");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  us3-adapter /etc/us3-adapter/config.yaml photos ls 2024/");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 5 || args.len() > 6 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let storage_name = &args[2];
    let command = args[3].as_str();
    let path = &args[4];
    let file = args.get(5).map(PathBuf::from);

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("Loaded configuration from {:?}", config_path);

    let Some(entry) = config.storage(storage_name) else {
        eprintln!("Unknown storage: {}", storage_name);
        std::process::exit(1);
    };

    let (_, storage) = us3_adapter::new(entry)?;
    info!("Using {}", storage);

    match command {
        "ls" => list(&storage, path, ListMode::Dir).await?,
        "find" => list(&storage, path, ListMode::Prefix).await?,
        "stat" => {
            let object = storage.stat(path, &StatOptions::default()).await?;
            print_stat(&object);
        }
        "get" => {
            let n = match &file {
                Some(file) => {
                    let mut out = tokio::fs::File::create(file).await?;
                    storage.read(path, &mut out, &ReadOptions::default()).await?
                }
                None => {
                    let mut out = tokio::io::stdout();
                    storage.read(path, &mut out, &ReadOptions::default()).await?
                }
            };
            info!("Downloaded {} bytes from {}", n, path);
        }
        "put" => {
            let Some(file) = &file else {
                print_usage();
                std::process::exit(1);
            };
            let input = tokio::fs::File::open(file).await?;
            let size = input.metadata().await?.len();
            let n = storage
                .write(path, input, size, &WriteOptions::default())
                .await?;
            info!("Uploaded {} bytes to {}", n, path);
        }
        "rm" => {
            storage.delete(path, &DeleteOptions::default()).await?;
            info!("Deleted {}", path);
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Print one line per object, directories marked with `d`
async fn list(
    storage: &Storage,
    path: &str,
    mode: ListMode,
) -> Result<(), Box<dyn std::error::Error>> {
    let opts = ListOptions {
        list_mode: Some(mode),
    };
    let mut it = storage.list(path, &opts)?;
    let mut stdout = tokio::io::stdout();
    let mut count = 0usize;

    while let Some(object) = it.next().await? {
        let line = if object.is_dir() {
            format!("d {:>12} {}\n", "-", object.path)
        } else {
            format!(
                "- {:>12} {}\n",
                object.content_length.unwrap_or_default(),
                object.path
            )
        };
        stdout.write_all(line.as_bytes()).await?;
        count += 1;
    }
    stdout.flush().await?;

    debug!("Listed {} objects under {:?}", count, path);
    Ok(())
}

fn print_stat(object: &Object) {
    println!("id:            {}", object.id);
    println!("path:          {}", object.path);
    println!("mode:          {}", object.mode);
    if let Some(length) = object.content_length {
        println!("content-length: {}", length);
    }
    if let Some(last_modified) = object.last_modified {
        println!("last-modified: {}", last_modified.to_rfc3339());
    }
    if let Some(content_type) = &object.content_type {
        println!("content-type:  {}", content_type);
    }
    if let Some(etag) = &object.etag {
        println!("etag:          {}", etag);
    }
    if let Some(storage_class) = object.storage_class() {
        println!("storage-class: {}", storage_class);
    }
}
