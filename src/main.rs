use std::io::Write;

use clap::Parser;
use notedb::{
    ConfigDb,
    DataDir,
    Error,
    ExportOutcome,
    IndexInit,
    NoteStore,
    SearchConfig,
    SearchIndex,
    cli::{Cli, Command, ConfigAction},
    config::{self, keys},
    config_db::RebuildRecord,
    document::WriteMode,
    error,
    note::{Note, today},
    note_id::NoteId,
    search,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("NOTEDB_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    if let Command::Config { action } = &cli.command {
        return cmd_config(&config_db, action);
    }

    let config = SearchConfig::resolve(&cli.overrides(), &config_db)?;
    let init = IndexInit::from_flag(
        cli.rebuild_index || matches!(cli.command, Command::Rebuild),
    );
    let index = SearchIndex::open(NoteStore::new(data_dir), init, config)?;
    if init == IndexInit::Rebuild {
        config_db.record_rebuild(RebuildRecord {
            at: chrono::Local::now().timestamp(),
            notes: index.doc_count()?,
            slots: index.fields().slots.len(),
        })?;
    }
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::Add(args) => {
            let note = Note::new(
                args.description,
                args.tags,
                args.attachments.into_attachments(),
            );
            let saved = index.upsert(&note, WriteMode::Insert)?;
            writeln!(stdout, "Added note {}", note_ref(&saved))?;
        }
        Command::Update(args) => {
            let mut note = find_note(index.store(), &args.reference)?;
            if let Some(description) = args.description {
                note.description = description;
            }
            if args.clear_tags {
                note.tags.clear();
            } else if !args.tags.is_empty() {
                note.tags = args.tags;
            }
            if args.clear_attachments {
                note.attachments.clear();
            }
            if !args.attachments.is_empty() {
                let added = args.attachments.into_attachments();
                if args.keep_attachments {
                    note.attachments.extend(added);
                } else {
                    note.attachments = added;
                }
            }
            note.modify_date = today();

            let saved = index.upsert(&note, WriteMode::Update)?;
            writeln!(stdout, "Updated note {}", note_ref(&saved))?;
        }
        Command::Show(args) => {
            let note = find_note(index.store(), &args.reference)?;
            if args.json {
                search::format_note_json(&mut stdout, &note)?;
            } else {
                search::format_note(&mut stdout, &note)?;
            }
        }
        Command::Delete(args) => {
            let note = find_note(index.store(), &args.reference)?;
            index.delete(&note)?;
            writeln!(stdout, "Deleted note {}", note_ref(&note))?;
        }
        Command::Search(args) => {
            let result = index.search_for_description(
                &args.query,
                !args.terms,
                &args.tags,
            )?;
            if args.json {
                search::format_json(
                    &mut stdout,
                    &result,
                    &args.query,
                    &args.tags,
                )?;
            } else {
                search::format_human(&mut stdout, &result)?;
            }
        }
        Command::Tags(args) => {
            let tags = index.unique_tags()?;
            search::format_tags(&mut stdout, &tags, args.json)?;
        }
        Command::Export(args) => {
            let store = index.store();
            let notes = store.load_all()?;
            match store.export_all(&args.dir, &notes) {
                ExportOutcome::Exported { notes, attachments } => {
                    writeln!(
                        stdout,
                        "Exported {notes} note(s) and {attachments} attachment \
                         file(s) to {}",
                        args.dir.display()
                    )?;
                }
                ExportOutcome::Rejected(message) => {
                    return Err(Error::ExportRejected(message));
                }
            }
        }
        Command::Rebuild => {
            writeln!(
                stdout,
                "Rebuilt search index: {} note(s)",
                index.doc_count()?
            )?;
        }
        Command::Status(args) => {
            cmd_status(&mut stdout, &index, &config_db, args.json)?;
        }
        Command::Config { .. } | Command::Completions(_) => {}
    }

    Ok(())
}

/// Find a note by full id or unambiguous id prefix.
fn find_note(store: &NoteStore, reference: &str) -> error::Result<Note> {
    let notes = store.load_all()?;
    let not_found = || Error::NotFound {
        kind: "note",
        name: reference.to_string(),
    };

    let id = NoteId::resolve(
        reference,
        notes.iter().filter_map(|n| n.id.as_deref()),
    )
    .map_err(Error::AmbiguousNote)?
    .ok_or_else(not_found)?;

    notes
        .into_iter()
        .find(|n| n.id.as_deref() == Some(id.as_str()))
        .ok_or_else(not_found)
}

fn note_ref(note: &Note) -> String {
    match note.id.clone() {
        Some(id) => NoteId::from(id).to_string(),
        None => "(unsaved)".to_string(),
    }
}

fn cmd_status(
    out: &mut impl Write,
    index: &SearchIndex,
    config_db: &ConfigDb,
    json: bool,
) -> error::Result<()> {
    let store = index.store();
    let root = store.data_dir().root().display().to_string();
    let records = store.load_all()?.len();
    let indexed = index.doc_count()?;
    let tags = index.unique_tags()?.len();
    let config = index.config();
    let slots = index.fields().slots.len();
    let last_rebuild = config_db.last_rebuild()?;

    if json {
        let status = json!({
            "data_dir": root,
            "notes": records,
            "indexed": indexed,
            "tags": tags,
            "phrase_slop": config.phrase_slop,
            "max_attachments": config.max_attachments,
            "index_slots": slots,
            "last_rebuild": last_rebuild.map(|r| r.at),
        });
        serde_json::to_writer(&mut *out, &status)?;
        writeln!(out)?;
    } else {
        writeln!(out, "Data directory: {root}")?;
        writeln!(out, "Notes: {records}")?;
        writeln!(out, "Indexed: {indexed}")?;
        writeln!(out, "Tags: {tags}")?;
        writeln!(out, "Phrase slop: {}", config.phrase_slop)?;
        writeln!(
            out,
            "Attachments per note: {} ({slots} index slots)",
            config.max_attachments
        )?;
        match last_rebuild.and_then(|r| {
            chrono::DateTime::from_timestamp(r.at, 0).map(|at| (at, r))
        }) {
            Some((at, r)) => writeln!(
                out,
                "Last rebuild: {} ({} note(s))",
                at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
                r.notes
            )?,
            None => writeln!(out, "Last rebuild: never")?,
        }
        if records as u64 != indexed {
            writeln!(
                out,
                "Index and records disagree; run `notedb rebuild` to resync."
            )?;
        }
    }
    Ok(())
}

fn cmd_config(config_db: &ConfigDb, action: &ConfigAction) -> error::Result<()> {
    let mut stdout = std::io::stdout().lock();
    match action {
        ConfigAction::Show { json } => {
            let defaults = SearchConfig::default();
            let stored = config_db.settings()?;
            let entries: Vec<_> = keys::ALL
                .iter()
                .map(|&key| {
                    let default = match key {
                        keys::PHRASE_SLOP => defaults.phrase_slop.to_string(),
                        _ => defaults.max_attachments.to_string(),
                    };
                    (key, stored.get(key).cloned(), default)
                })
                .collect();

            if *json {
                let map: serde_json::Map<String, serde_json::Value> = entries
                    .into_iter()
                    .map(|(key, stored, default)| {
                        (
                            key.to_string(),
                            json!({ "stored": stored, "default": default }),
                        )
                    })
                    .collect();
                serde_json::to_writer(&mut stdout, &map)?;
                writeln!(stdout)?;
            } else {
                for (key, stored, default) in entries {
                    match stored {
                        Some(value) => writeln!(stdout, "{key} = {value}")?,
                        None => {
                            writeln!(stdout, "{key} = {default} (default)")?
                        }
                    }
                }
            }
        }
        ConfigAction::Set { key, value } => {
            config::validate_setting(key, value)?;
            config_db.set_setting(key, value.trim())?;
            writeln!(stdout, "Set {key} = {}", value.trim())?;
        }
        ConfigAction::Clear { key } => {
            if !config_db.remove_setting(key)? {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key.clone(),
                });
            }
            writeln!(stdout, "Cleared {key}")?;
        }
    }
    Ok(())
}
