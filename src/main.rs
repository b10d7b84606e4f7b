//! # LiveText - Snippet Tabstops from the Command Line
//!
//! Parses LiveText snippets and replays editing sessions against them.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the parse tree, backrefs and insertion table
//! cargo run -- parse '<[[%tabstop1:div]]>[[%tabstop]]</[[%tabstop1]]>'
//!
//! # Insert into a document and replay keys
//! cargo run -- expand 'let [[%tabstop1:x]] = [[%tabstop:0]]; f([[%tabstop1]]);' \
//!     --keys 'type:count,tab,type:42' --events
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livetext_core::{
    parse_key_script, Command, Config, EditorEvent, Editor, EventHandler, LiveText,
    Parser as SnippetParser, TabstopInsertionNode,
};

/// LiveText - snippet tabstops with live-linked backrefs
#[derive(Parser, Debug)]
#[command(name = "livetext")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Parse a snippet and print its structure
    Parse {
        /// Snippet source, or `-` to read standard input
        snippet: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Insert a snippet into a document and replay keys
    Expand {
        /// Snippet source, or `-` to read standard input
        snippet: String,

        /// Initial document text
        #[arg(long, default_value = "")]
        text: String,

        /// Character offset to insert at (defaults to the end)
        #[arg(long)]
        at: Option<usize>,

        /// Comma-separated keys: tab, bs, del, esc, undo, redo,
        /// type:<text>, caret:<n>, select:<a>-<b>
        #[arg(long, default_value = "")]
        keys: String,

        /// Print the events the session produced
        #[arg(long)]
        events: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Action::Parse { snippet, json } => {
            let source = read_snippet(snippet)?;
            let live = SnippetParser::new(&source)
                .with_policy(config.tabstops.backref_conflict)
                .parse()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&live)?);
            } else {
                print!("{}", render_parse(&live));
            }
        }
        Action::Expand {
            snippet,
            text,
            at,
            keys,
            events,
            json,
        } => {
            let source = read_snippet(snippet)?;
            let session = Session {
                source: &source,
                text: &text,
                at,
                keys: &keys,
            };
            let (report, recorded) = session.run(config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            if events {
                for event in &recorded {
                    println!("{}", serde_json::to_string(event)?);
                }
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("cannot load config from {}", path.display())),
        None => Ok(Config::load()),
    }
}

fn read_snippet(snippet: String) -> anyhow::Result<String> {
    if snippet != "-" {
        return Ok(snippet);
    }
    let mut source = String::new();
    std::io::stdin()
        .read_to_string(&mut source)
        .context("cannot read snippet from standard input")?;
    // A trailing newline from the shell is not part of the snippet
    if source.ends_with('\n') {
        source.pop();
        if source.ends_with('\r') {
            source.pop();
        }
    }
    Ok(source)
}

// ==================== Parse ====================

fn render_parse(live: &LiveText) -> String {
    let mut out = String::new();
    out.push_str("tree:\n");
    for line in live.describe().lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }

    if !live.backrefs.is_empty() {
        out.push_str("backrefs:\n");
        for (number, text) in live.backrefs.iter() {
            out.push_str(&format!("  #{number} = {text:?}\n"));
        }
    }

    out.push_str("tabstops:\n");
    for (index, entry) in live.table.iter().enumerate() {
        out.push_str(&format!("  {index}: {}\n", describe_entry(entry)));
    }

    for warning in &live.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    out
}

fn describe_entry(entry: &TabstopInsertionNode) -> String {
    match entry.backref_number {
        Some(number) if entry.is_backref_anchor => {
            format!("{} backref #{number} (anchor)", entry.indicator)
        }
        Some(number) => format!("{} backref #{number}", entry.indicator),
        None => entry.indicator.to_string(),
    }
}

// ==================== Expand ====================

struct Session<'a> {
    source: &'a str,
    text: &'a str,
    at: Option<usize>,
    keys: &'a str,
}

/// Final state of an expand session.
#[derive(Debug, Serialize)]
struct Report {
    text: String,
    selection: Range<usize>,
    remaining_tabstops: usize,
    linked: Option<LinkedReport>,
}

#[derive(Debug, Serialize)]
struct LinkedReport {
    backref: u32,
    members: usize,
}

impl Session<'_> {
    /// Runs the session and returns its final state with every event it
    /// produced.
    async fn run(&self, config: Config) -> anyhow::Result<(Report, Vec<EditorEvent>)> {
        let commands = parse_key_script(self.keys)?;

        let mut editor = Editor::with_config(config);
        let mut handler = EventHandler::new(editor.subscribe());

        editor.new_document(self.text);
        let at = self.at.unwrap_or_else(|| self.text.chars().count());
        editor.execute(Command::MoveCaret { position: at })?;
        editor.execute(Command::InsertSnippet {
            source: self.source.to_string(),
        })?;
        for command in commands {
            let name = command.display_name().to_string();
            editor
                .execute(command)
                .with_context(|| format!("{name} failed"))?;
        }

        let report = Report::of(&editor)?;

        // Dropping the editor closes the bus, which ends the event stream
        drop(editor);
        let mut events = Vec::new();
        while let Some(event) = handler.next().await {
            events.push(event);
        }
        Ok((report, events))
    }
}

impl Report {
    fn of(editor: &Editor) -> anyhow::Result<Self> {
        let doc = editor.active_document()?;
        let tabstops = doc.tabstops();
        Ok(Self {
            text: doc.text().into_owned(),
            selection: doc.selection().range(),
            remaining_tabstops: tabstops.table().len(),
            linked: tabstops
                .linked_group()
                .map(|(backref, members)| LinkedReport { backref, members }),
        })
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("text: {:?}\n", self.text));
        out.push_str(&format!(
            "selection: {}..{}\n",
            self.selection.start, self.selection.end
        ));
        out.push_str(&format!("remaining tabstops: {}\n", self.remaining_tabstops));
        match &self.linked {
            Some(linked) => out.push_str(&format!(
                "linked: backref #{} ({} members)\n",
                linked.backref, linked.members
            )),
            None => out.push_str("linked: none\n"),
        }
        out
    }
}
