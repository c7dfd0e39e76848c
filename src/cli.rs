use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{config::Overrides, note::Attachment};

#[derive(Debug, Parser)]
#[command(
    name = "notedb",
    about = "Notes with tags and attachments, searchable from the terminal"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true, env = "NOTEDB_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Regenerate the search index and attachment tree from notes.json
    /// before running the command
    #[arg(long, global = true, env = "NOTEDB_REBUILD_INDEX")]
    pub rebuild_index: bool,

    /// Positions phrase terms may be apart (overrides the stored setting)
    #[arg(long, global = true, env = "NOTEDB_PHRASE_SLOP")]
    pub phrase_slop: Option<u32>,

    /// Attachment slots per note (overrides the stored setting)
    #[arg(long, global = true, env = "NOTEDB_MAX_ATTACHMENTS")]
    pub max_attachments: Option<usize>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            phrase_slop: self.phrase_slop,
            max_attachments: self.max_attachments,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a note
    Add(AddArgs),
    /// Change the description, tags or attachments of a note
    Update(UpdateArgs),
    /// Print a note
    Show(ShowArgs),
    /// Delete a note and its attachment files
    Delete(DeleteArgs),
    /// Search descriptions and attachments
    Search(SearchArgs),
    /// List the tags in use
    Tags(TagsArgs),
    /// Copy all notes and attachment files into an empty directory
    Export(ExportArgs),
    /// Regenerate the search index and attachment tree from notes.json
    Rebuild,
    /// Show data directory, settings and index statistics
    Status(StatusArgs),
    /// Manage stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Attachments --

/// Attachment options shared by `add` and `update`.
#[derive(Debug, Default, clap::Args)]
pub struct AttachmentArgs {
    /// Attach a file, optionally annotated: PATH[=NOTE]
    #[arg(
        short = 'a',
        long = "attach",
        value_name = "PATH[=NOTE]",
        value_parser = parse_file_attachment
    )]
    pub files: Vec<Attachment>,

    /// Attach a link, optionally annotated: "URL[ NOTE]"
    #[arg(
        short = 'u',
        long = "url",
        value_name = "URL[ NOTE]",
        value_parser = parse_url_attachment
    )]
    pub urls: Vec<Attachment>,

    /// Attach a free-standing annotation
    #[arg(
        short = 'm',
        long = "memo",
        value_name = "TEXT",
        value_parser = parse_memo
    )]
    pub memos: Vec<Attachment>,
}

impl AttachmentArgs {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.urls.is_empty() && self.memos.is_empty()
    }

    /// Files first, then links, then annotations.
    pub fn into_attachments(self) -> Vec<Attachment> {
        let mut attachments = self.files;
        attachments.extend(self.urls);
        attachments.extend(self.memos);
        attachments
    }
}

fn parse_file_attachment(raw: &str) -> Result<Attachment, String> {
    let (path, note) = match raw.split_once('=') {
        Some((path, note)) => (path, Some(note.to_string())),
        None => (raw, None),
    };
    if path.trim().is_empty() {
        return Err("attachment path is empty".into());
    }
    Ok(Attachment::file(path, note))
}

fn parse_url_attachment(raw: &str) -> Result<Attachment, String> {
    let raw = raw.trim();
    let (url, note) = match raw.split_once(char::is_whitespace) {
        Some((url, note)) => (url, Some(note.to_string())),
        None => (raw, None),
    };
    if url.is_empty() {
        return Err("URL is empty".into());
    }
    Ok(Attachment::url(url, note))
}

fn parse_memo(raw: &str) -> Result<Attachment, String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err("annotation is empty".into());
    }
    Ok(Attachment {
        note: Some(text.to_string()),
        ..Attachment::default()
    })
}

// -- Add / Update --

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Text of the note
    pub description: String,

    /// Tag the note (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    #[command(flatten)]
    pub attachments: AttachmentArgs,
}

#[derive(Debug, Parser)]
pub struct UpdateArgs {
    /// Note id or id prefix, with or without a leading '#'
    pub reference: String,

    /// New text of the note
    #[arg(short, long)]
    pub description: Option<String>,

    /// Replace the tags (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Remove every tag
    #[arg(long, conflicts_with = "tags")]
    pub clear_tags: bool,

    #[command(flatten)]
    pub attachments: AttachmentArgs,

    /// Add the given attachments to the existing ones instead of replacing
    /// them
    #[arg(long)]
    pub keep_attachments: bool,

    /// Remove every attachment
    #[arg(long, conflicts_with = "keep_attachments")]
    pub clear_attachments: bool,
}

// -- Show / Delete --

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Note id or id prefix, with or without a leading '#'
    pub reference: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    /// Note id or id prefix, with or without a leading '#'
    pub reference: String,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Words to look for; omit to list notes by tag only
    #[arg(default_value = "")]
    pub query: String,

    /// Only notes carrying this tag (repeatable, all must match)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Parse the query as terms the description must contain instead of
    /// a phrase
    #[arg(long)]
    pub terms: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct TagsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Export --

#[derive(Debug, Parser)]
pub struct ExportArgs {
    /// Empty (or missing) directory to write the snapshot into
    pub dir: PathBuf,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show every setting and where its value comes from
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting in config.redb
    Set {
        /// Setting name (phrase_slop or max_attachments)
        key: String,
        value: String,
    },
    /// Clear a stored setting (revert to default)
    Clear {
        /// Setting name
        key: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "notedb",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_add_with_attachments() {
        let cli = Cli::parse_from([
            "notedb",
            "add",
            "pay rent",
            "-t",
            "home",
            "--attach",
            "/tmp/lease.pdf=signed copy",
            "--url",
            "https://bank.example/pay monthly transfer",
            "--memo",
            "due on the 1st",
        ]);
        let Command::Add(args) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(args.description, "pay rent");
        assert_eq!(args.tags, vec!["home"]);

        let attachments = args.attachments.into_attachments();
        assert_eq!(attachments.len(), 3);
        assert_eq!(
            attachments[0].file_path.as_deref(),
            Some(Path::new("/tmp/lease.pdf"))
        );
        assert_eq!(attachments[0].note.as_deref(), Some("signed copy"));
        assert_eq!(
            attachments[1].http_url.as_deref(),
            Some("https://bank.example/pay")
        );
        assert_eq!(attachments[1].note.as_deref(), Some("monthly transfer"));
        assert_eq!(attachments[2].note.as_deref(), Some("due on the 1st"));
    }

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["notedb", "search"]);
        let Command::Search(args) = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(args.query, "");
        assert!(args.tags.is_empty());
        assert!(!args.terms);
        assert!(!args.json);
    }

    #[test]
    fn global_overrides() {
        let cli = Cli::parse_from([
            "notedb",
            "tags",
            "--phrase-slop",
            "0",
            "--max-attachments",
            "9",
            "--rebuild-index",
        ]);
        assert!(cli.rebuild_index);
        let overrides = cli.overrides();
        assert_eq!(overrides.phrase_slop, Some(0));
        assert_eq!(overrides.max_attachments, Some(9));
    }

    #[test]
    fn empty_attachment_values_are_rejected() {
        assert!(parse_file_attachment("=note").is_err());
        assert!(parse_url_attachment("   ").is_err());
        assert!(parse_memo("").is_err());
    }

    #[test]
    fn clear_tags_conflicts_with_tags() {
        let result = Cli::try_parse_from([
            "notedb",
            "update",
            "abc",
            "--tag",
            "x",
            "--clear-tags",
        ]);
        assert!(result.is_err());
    }
}
