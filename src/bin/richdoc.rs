use clap::{Parser, Subcommand};
use richdoc::config::EngineConfig;
use richdoc::draw_context::FixedMetrics;
use richdoc::richtext::{Document, TextFormat};
use richdoc::richtext::text_string::{LINE_SEPARATOR, OBJECT_REPLACEMENT};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Parser, Debug)]
#[command(name = "richdoc")]
#[command(about = "Lay out and convert rich text documents", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Settings file to use instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the visual lines of a document
    Layout {
        file: PathBuf,
        /// Width to lay out at
        #[arg(short, long, default_value = "600")]
        width: i32,
        /// Read the file as markup
        #[arg(long, conflicts_with = "markdown")]
        rich: bool,
        /// Read the file as Markdown
        #[arg(long)]
        markdown: bool,
    },
    /// Convert markup to plain text
    Plain { file: PathBuf },
    /// Convert plain text (or Markdown) to markup
    Rich {
        file: PathBuf,
        /// Read the file as Markdown
        #[arg(long)]
        markdown: bool,
    },
    /// Print document statistics
    Stats {
        file: PathBuf,
        /// Width to lay out at
        #[arg(short, long, default_value = "600")]
        width: i32,
    },
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(EngineConfig::load_or_default()),
    }
}

fn read(file: &Path) -> Result<String, String> {
    fs::read_to_string(file).map_err(|e| format!("Failed to read '{}': {}", file.display(), e))
}

fn new_document(config: &EngineConfig) -> Document {
    Document::with_config(Rc::new(FixedMetrics::default()), config)
}

fn line_text(doc: &Document, id: richdoc::richtext::paragraph::ParagId, start: usize, end: usize) -> String {
    let Some(parag) = doc.parag(id) else {
        return String::new();
    };
    // the sentinel is not part of the text
    let end = end.min(parag.length() - 1);
    parag.string().chars()[start.min(end)..end]
        .iter()
        .filter_map(|cell| match cell.c {
            OBJECT_REPLACEMENT if cell.is_custom() => None,
            LINE_SEPARATOR => None,
            c => Some(c),
        })
        .collect()
}

fn cmd_layout(file: &Path, width: i32, format: TextFormat, markdown: bool, config: &EngineConfig) -> Result<(), String> {
    let contents = read(file)?;
    let mut doc = new_document(config);
    if markdown {
        doc.set_markdown(&contents);
    } else {
        doc.set_text(&contents, format);
    }
    doc.set_width(width);
    doc.format_all();

    for (id, parag) in doc.iter() {
        let top = parag.rect().y;
        for line in 0..parag.lines() {
            let Some((start, ls)) = parag.line_start_of_line(line) else {
                continue;
            };
            let end = parag.line_end_of_line(line).unwrap_or(start);
            println!(
                "{} {} {} {} {}",
                parag.number(),
                line,
                top + ls.y,
                ls.h,
                line_text(&doc, id, start, end)
            );
        }
    }
    Ok(())
}

fn cmd_plain(file: &Path, config: &EngineConfig) -> Result<(), String> {
    let mut doc = new_document(config);
    doc.set_text(&read(file)?, TextFormat::RichText);
    print!("{}", doc.plain_text());
    Ok(())
}

fn cmd_rich(file: &Path, markdown: bool, config: &EngineConfig) -> Result<(), String> {
    let contents = read(file)?;
    let mut doc = new_document(config);
    if markdown {
        doc.set_markdown(&contents);
    } else {
        doc.set_text(&contents, TextFormat::PlainText);
    }
    println!("{}", doc.rich_text());
    Ok(())
}

fn cmd_stats(file: &Path, width: i32, config: &EngineConfig) -> Result<(), String> {
    let mut doc = new_document(config);
    doc.set_text(&read(file)?, TextFormat::AutoText);
    doc.set_width(width);
    doc.format_all();
    let stats = doc.stats();
    println!("paragraphs:    {}", stats.paragraphs);
    println!("height:        {}", stats.height);
    println!("minimum width: {}", stats.minimum_width);
    println!("widest line:   {}", stats.widest_line);
    println!("formats:       {}", stats.formats);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match &args.command {
        Commands::Layout {
            file,
            width,
            rich,
            markdown,
        } => {
            let format = if *rich { TextFormat::RichText } else { TextFormat::AutoText };
            cmd_layout(file, *width, format, *markdown, &config)
        }
        Commands::Plain { file } => cmd_plain(file, &config),
        Commands::Rich { file, markdown } => cmd_rich(file, *markdown, &config),
        Commands::Stats { file, width } => cmd_stats(file, *width, &config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
