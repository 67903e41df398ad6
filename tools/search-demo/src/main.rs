//! Minimal end-to-end demo: ingest text files into the global collection and
//! run hybrid queries against it. With no embedding model configured the
//! backend-default embedding is used, so everything works offline.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use point_model::{DocumentId, GLOBAL_COLLECTION};
use retrieval_service::{EngineConfig, ProgressEvent, RetrievalService};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            usage();
            ExitCode::FAILURE
        }
    }
}

fn usage() {
    eprintln!("usage:");
    eprintln!("  search-demo <data-dir> ingest <doc-id> <text-file>");
    eprintln!("  search-demo <data-dir> query <text> [n]");
    eprintln!("  search-demo <data-dir> delete <doc-id>");
}

fn run(args: &[String]) -> Result<(), String> {
    if args.len() < 2 {
        return Err("missing arguments".into());
    }
    let data_dir = PathBuf::from(&args[0]);
    let cfg = EngineConfig::load(&data_dir.join("rag_config.json"));
    let service = RetrievalService::new(cfg, &data_dir).map_err(|err| err.to_string())?;

    match args[1].as_str() {
        "ingest" if args.len() == 4 => {
            let doc_id = DocumentId::new(args[2].clone());
            let text = fs::read_to_string(&args[3])
                .map_err(|err| format!("reading `{}`: {err}", args[3]))?;
            let progress: Box<dyn FnMut(ProgressEvent) + Send> = Box::new(|event| {
                if let ProgressEvent::EmbedBatch { done, total } = event {
                    eprintln!("embedded {done}/{total}");
                }
            });
            let report = service
                .process_document(&text, &doc_id, GLOBAL_COLLECTION, None, Some(progress))
                .map_err(|err| err.to_string())?;
            println!(
                "document {} -> {} chunks ({} vectors, {} lexical entries)",
                report.document_id,
                report.chunk_count,
                report.indexed_vectors,
                report.indexed_lexical
            );
            Ok(())
        }
        "query" if args.len() == 3 || args.len() == 4 => {
            let n = match args.get(3) {
                Some(raw) => raw.parse().map_err(|_| "n must be a number".to_string())?,
                None => service.config().context_window,
            };
            let hits = service.search_similar(&args[2], GLOBAL_COLLECTION, n);
            if hits.is_empty() {
                println!("no results");
            }
            for (rank, hit) in hits.iter().enumerate() {
                let preview: String = hit.content.chars().take(80).collect();
                println!("{:>2}. [{:.4}] {}  {}", rank + 1, hit.score, hit.id, preview);
            }
            Ok(())
        }
        "delete" if args.len() == 3 => {
            service.delete_document(&DocumentId::new(args[2].clone()), GLOBAL_COLLECTION);
            println!("deleted document {}", args[2]);
            Ok(())
        }
        _ => Err("unknown or malformed command".into()),
    }
}
