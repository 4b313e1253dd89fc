use clap::Parser;
use docsearch_context::text::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, chunk_document};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};

/// A CLI tool to chunk text files into JSON output using docsearch-context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum length of each chunk in characters.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    overlap: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let file_content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let config = ChunkingConfig::new(args.size, args.overlap);
    let chunks = chunk_document(&file_content, &config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    #[derive(Serialize)]
    struct SerializableChunk<'a> {
        index: usize,
        total: usize,
        chars: usize,
        text: &'a str,
    }

    let serializable_chunks: Vec<SerializableChunk> = chunks
        .iter()
        .map(|c| SerializableChunk {
            index: c.index,
            total: c.total_in_document,
            chars: c.text.chars().count(),
            text: &c.text,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&serializable_chunks)?;
    println!("{}", json_output);

    Ok(())
}
