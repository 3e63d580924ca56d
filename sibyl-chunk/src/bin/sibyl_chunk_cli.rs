use clap::Parser;
use serde::Serialize;
use sibyl_chunk::text::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextSplitter};
use std::fs;
use std::io::{self, Read};

/// A CLI tool to split text files into overlapping chunks as JSON output.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum length of each chunk in characters.
    #[arg(short = 's', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Overlap between consecutive chunks in characters.
    #[arg(short = 'o', long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,
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

    let splitter = TextSplitter::new(args.chunk_size, args.chunk_overlap);
    let chunks = splitter.split(&file_content);

    #[derive(Serialize)]
    struct SerializableChunk {
        sequence: usize,
        length: usize,
        text: String,
    }

    let serializable_chunks: Vec<SerializableChunk> = chunks
        .into_iter()
        .enumerate()
        .map(|(sequence, text)| SerializableChunk {
            sequence,
            length: text.len(),
            text,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&serializable_chunks)?;
    println!("{}", json_output);

    Ok(())
}
