use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::io::{self, BufRead};
use std::path;
use std::sync::Arc;
use uuid::Uuid;

use vaultsync::crypto::{generate_password, GeneratorOptions};
use vaultsync::entry::{LoginData, NoteData, PasswordData};
use vaultsync::logging::init_tracing;
use vaultsync::{Config, EntryKind, EntryPayload, FileRemote, Keep, Session, Table, Vault};

///////////////////////
// Utility functions //
///////////////////////

/// Master password from VAULTSYNC_PASSWORD or the first line of stdin
fn read_password() -> Result<String, Box<dyn Error>> {
	if let Ok(password) = std::env::var("VAULTSYNC_PASSWORD") {
		return Ok(password);
	}
	eprint!("Master password: ");
	let mut line = String::new();
	io::stdin().lock().read_line(&mut line)?;
	let password = line.trim_end_matches(&['\r', '\n'][..]).to_string();
	if password.is_empty() {
		return Err("No master password given".into());
	}
	Ok(password)
}

fn unlock(vault: &Vault) -> Result<Session, Box<dyn Error>> {
	Ok(vault.unlock(&read_password()?)?)
}

fn parse_id(matches: &ArgMatches) -> Result<Uuid, Box<dyn Error>> {
	let id = matches.get_one::<String>("id").ok_or("record id required")?;
	Ok(Uuid::parse_str(id).map_err(|e| format!("Invalid id {}: {}", id, e))?)
}

fn arg(matches: &ArgMatches, name: &str) -> Option<String> {
	matches.get_one::<String>(name).cloned()
}

fn entry_args() -> Vec<Arg> {
	vec![
		Arg::new("title").long("title").value_name("TITLE"),
		Arg::new("description").long("description").value_name("TEXT"),
		Arg::new("username").long("username").value_name("USER"),
		Arg::new("secret").long("secret").value_name("PASSWORD").help("Stored password"),
		Arg::new("url").long("url").value_name("URL"),
		Arg::new("note").long("note").value_name("TEXT"),
		Arg::new("generate")
			.long("generate")
			.action(ArgAction::SetTrue)
			.help("Generate the stored password"),
	]
}

fn secret_arg(matches: &ArgMatches, generator: &GeneratorOptions) -> Result<Option<String>, Box<dyn Error>> {
	if matches.get_flag("generate") {
		return Ok(Some(generate_password(generator)?));
	}
	Ok(arg(matches, "secret"))
}

/// Apply the entry flags given on the command line to `payload`
fn apply_entry_args(
	payload: &mut EntryPayload,
	matches: &ArgMatches,
	generator: &GeneratorOptions,
) -> Result<(), Box<dyn Error>> {
	if let Some(title) = arg(matches, "title") {
		payload.title = title;
	}
	if let Some(description) = arg(matches, "description") {
		payload.description = description;
	}
	let secret = secret_arg(matches, generator)?;
	match &mut payload.kind {
		EntryKind::Login(data) => {
			if let Some(username) = arg(matches, "username") {
				data.username = username;
			}
			if let Some(secret) = secret {
				data.password = secret;
			}
			if let Some(url) = arg(matches, "url") {
				data.url = url;
			}
			if let Some(note) = arg(matches, "note") {
				data.note = note;
			}
		}
		EntryKind::Password(data) => {
			if let Some(secret) = secret {
				data.password = secret;
			}
			if let Some(url) = arg(matches, "url") {
				data.url = url;
			}
			if let Some(note) = arg(matches, "note") {
				data.note = note;
			}
		}
		EntryKind::Note(data) => {
			if let Some(note) = arg(matches, "note") {
				data.note = note;
			}
		}
	}
	Ok(())
}

//////////////
// Commands //
//////////////

async fn cmd_sync(config: &Config, vault: &Vault) -> Result<(), Box<dyn Error>> {
	let remote = Arc::new(FileRemote::open(&config.remote_path())?);
	let report = vault.reconciler(remote).run().await?;

	for table in &report.tables {
		println!(
			"{}: {} pushed, {} pulled, {} removed",
			table.table, table.pushed, table.pulled, table.removed_locally
		);
	}
	for error in report.errors() {
		println!("error: {}", error);
	}
	for conflict in report.conflicts() {
		println!("conflict: {}", conflict);
	}
	for failure in &report.failures {
		println!("failed: {}: {}", failure.table, failure.message);
	}
	if !report.advanced {
		return Err("Sync incomplete; pending changes were kept".into());
	}
	Ok(())
}

async fn cmd_list(vault: &Vault) -> Result<(), Box<dyn Error>> {
	let session = unlock(vault)?;
	let mut decrypted = vault.entries(&session).await?;
	decrypted.entries.sort_by(|a, b| a.payload.title.cmp(&b.payload.title));

	for entry in &decrypted.entries {
		println!(
			"{}  {:<8}  {}  (updated {})",
			entry.id,
			entry.payload.kind.type_name(),
			entry.payload.title,
			entry.updated_at.format("%Y-%m-%d %H:%M")
		);
	}
	for id in &decrypted.corrupted_ids {
		println!("{}  corrupted, unreadable", id);
	}
	Ok(())
}

fn cmd_status(config: &Config, vault: &Vault) -> Result<(), Box<dyn Error>> {
	let store = vault.store();
	println!("Profile:      {}", config.profile);
	println!("Database:     {}", config.db_path().display());
	println!("Remote:       {}", config.remote_path().display());
	println!("Owner:        {}", vault.owner_id());
	println!("Last synced:  {}", store.last_synced_at()?);
	println!("Pending:      {}", store.transactions()?.len());
	println!("Conflicts:    {}", store.open_conflicts()?.len());
	println!("Sync running: {}", store.is_sync_locked()?);
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let entry_kinds = ["login", "password", "note"];
	let matches = Command::new("vaultsync")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilu@symbion.hu>")
		.about("Offline-first encrypted record vault")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Config file (.toml, .json or .json5)"),
		)
		.arg(
			Arg::new("profile")
				.short('p')
				.long("profile")
				.value_name("PROFILE")
				.help("Profile"),
		)
		.arg(Arg::new("remote").long("remote").value_name("DIR").help("Remote directory"))
		.subcommand(Command::new("init").about("Create the local vault"))
		.subcommand(
			Command::new("add")
				.about("Add an entry")
				.arg(
					Arg::new("type")
						.long("type")
						.value_parser(entry_kinds)
						.default_value("login"),
				)
				.args(entry_args()),
		)
		.subcommand(Command::new("list").about("List decrypted entries"))
		.subcommand(
			Command::new("update")
				.about("Change an entry")
				.arg(Arg::new("id").required(true))
				.args(entry_args()),
		)
		.subcommand(
			Command::new("delete").about("Delete an entry").arg(Arg::new("id").required(true)),
		)
		.subcommand(Command::new("sync").about("Reconcile with the remote"))
		.subcommand(Command::new("conflicts").about("List open conflicts"))
		.subcommand(
			Command::new("resolve")
				.about("Resolve an open conflict")
				.arg(Arg::new("table").required(true).value_parser(["entries", "structure"]))
				.arg(Arg::new("id").required(true))
				.arg(Arg::new("keep").required(true).value_parser(["local", "remote"])),
		)
		.subcommand(
			Command::new("generate").about("Generate a password").arg(
				Arg::new("length")
					.short('l')
					.long("length")
					.value_parser(clap::value_parser!(usize)),
			),
		)
		.subcommand(Command::new("status").about("Show vault state"))
		.get_matches();

	let mut config = Config::load(matches.get_one::<String>("config").map(path::Path::new))?;
	if let Some(profile) = matches.get_one::<String>("profile") {
		config.profile = profile.clone();
	}
	if let Some(remote) = matches.get_one::<String>("remote") {
		config.remote_dir = Some(path::PathBuf::from(remote));
	}
	config.validate()?;
	init_tracing(&config.log_level, config.log_format);

	if let Some(sub) = matches.subcommand_matches("generate") {
		let mut options = config.generator;
		if let Some(length) = sub.get_one::<usize>("length") {
			options.length = *length;
		}
		println!("{}", generate_password(&options)?);
		return Ok(());
	}

	let vault = Vault::open(&config)?;

	match matches.subcommand() {
		Some(("init", _)) => {
			println!("Vault {} ready at {}", vault.owner_id(), config.db_path().display());
		}
		Some(("add", sub)) => {
			let session = unlock(&vault)?;
			let kind = match sub.get_one::<String>("type").map(String::as_str) {
				Some("password") => EntryKind::Password(PasswordData::default()),
				Some("note") => EntryKind::Note(NoteData::default()),
				_ => EntryKind::Login(LoginData::default()),
			};
			let mut payload = EntryPayload { title: String::new(), description: String::new(), kind };
			apply_entry_args(&mut payload, sub, &config.generator)?;
			let id = vault.add_entry(&session, &payload)?;
			println!("{}", id);
		}
		Some(("list", _)) => cmd_list(&vault).await?,
		Some(("update", sub)) => {
			let session = unlock(&vault)?;
			let id = parse_id(sub)?;
			let mut payload = vault.entry(&session, id)?;
			apply_entry_args(&mut payload, sub, &config.generator)?;
			vault.update_entry(&session, id, &payload)?;
		}
		Some(("delete", sub)) => vault.delete_entry(parse_id(sub)?)?,
		Some(("sync", _)) => cmd_sync(&config, &vault).await?,
		Some(("conflicts", _)) => {
			for conflict in vault.conflicts()? {
				let stamp = |r: &Option<vaultsync::Record>| {
					r.as_ref().map(|r| r.updated_at.to_rfc3339()).unwrap_or_else(|| "-".into())
				};
				println!(
					"{} {}  {}  local {}  remote {}",
					conflict.table,
					conflict.id,
					conflict.reason,
					stamp(&conflict.local),
					stamp(&conflict.remote)
				);
			}
		}
		Some(("resolve", sub)) => {
			let table: Table = sub.get_one::<String>("table").ok_or("table required")?.parse()?;
			let keep: Keep = sub.get_one::<String>("keep").ok_or("side required")?.parse()?;
			vault.resolve_conflict(table, parse_id(sub)?, keep)?;
		}
		Some(("status", _)) => cmd_status(&config, &vault)?,
		_ => {}
	}

	Ok(())
}

// vim: ts=4
