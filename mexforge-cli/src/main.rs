use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use mexforge_core::disc::{self, AddressTable};
use mexforge_core::store::FileStore;
use mexforge_core::workspace::Workspace;
use mexforge_core::{package, run, CompileSettings, ForgeError};

#[derive(Debug, Parser)]
#[command(name = "mexforge", version, about = "Melee mod project compiler")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile the workspace and optionally assemble a disc image.
    Compile {
        #[arg(long, required_unless_present = "settings")]
        workspace: Option<PathBuf>,

        /// Load every option from a JSON settings file instead.
        #[arg(long, conflicts_with_all = ["workspace", "output", "address_table"])]
        settings: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        address_table: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        debug: bool,
    },
    /// Assemble a disc image from the workspace without compiling.
    BuildIso {
        #[arg(long)]
        workspace: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        address_table: Option<PathBuf>,
    },
    /// Unpack a disc image into a workspace.
    Extract {
        #[arg(long)]
        iso: PathBuf,

        #[arg(long)]
        workspace: PathBuf,

        /// Expected CRC32 of the image, in hex.
        #[arg(long, value_parser = parse_crc)]
        expected_crc: Option<u32>,

        /// Write an address table pinning every file to its original slot.
        #[arg(long)]
        export_table: Option<PathBuf>,
    },
    /// Copy one entry of a zip package into the workspace's assets.
    Import {
        #[arg(long)]
        workspace: PathBuf,

        #[arg(long)]
        package: PathBuf,

        #[arg(long)]
        entry: String,

        /// Destination path, or a directory when it ends with '/'.
        #[arg(long, default_value = "assets/")]
        dest: String,
    },
}

fn parse_crc(value: &str) -> Result<u32, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid CRC32 '{value}': {e}"))
}

fn execute(command: Command) -> Result<(), ForgeError> {
    match command {
        Command::Compile {
            workspace,
            settings,
            output,
            address_table,
            debug,
        } => {
            let settings = match (settings, workspace) {
                (Some(path), _) => {
                    let mut settings = CompileSettings::from_json_file(&path)?;
                    settings.debug |= debug;
                    settings
                }
                (None, Some(workspace_path)) => CompileSettings {
                    workspace_path,
                    output_iso: output,
                    address_table,
                    expected_disc_crc: None,
                    debug,
                },
                (None, None) => {
                    return Err(ForgeError::Config("either --workspace or --settings is required".to_string()))
                }
            };
            let report = run(settings)?;
            print!("{}", report.render());
        }
        Command::BuildIso {
            workspace,
            output,
            address_table,
        } => {
            let table = match &address_table {
                Some(path) => Some(AddressTable::from_json_file(path)?),
                None => None,
            };
            let workspace = Workspace::open(&workspace)?;
            let summary = workspace.build_disc(&output, table.as_ref())?;
            println!(
                "Wrote {} ({} files, {} bytes, CRC32 {:08X})",
                output.display(),
                summary.file_count,
                summary.size,
                summary.crc32
            );
        }
        Command::Extract {
            iso,
            workspace,
            expected_crc,
            export_table,
        } => {
            let mut store = FileStore::open(&workspace)?;
            let extracted = disc::extract_disc(&iso, &mut store, expected_crc)?;
            store.save()?;
            if let Some(path) = export_table {
                extracted.table.write_json_file(&path)?;
                info!("Wrote address table to {}", path.display());
            }
            println!(
                "Extracted {} files (CRC32 {:08X})",
                extracted.summary.file_count, extracted.summary.crc32
            );
        }
        Command::Import {
            workspace,
            package,
            entry,
            dest,
        } => {
            let mut store = FileStore::open(&workspace)?;
            match package::set_from_package(&mut store, &package, &entry, &dest)? {
                Some(path) => {
                    store.save()?;
                    println!("Imported {entry} as {path}");
                }
                None => {
                    return Err(ForgeError::Config(format!(
                        "{} has no entry named {entry}",
                        package.display()
                    )))
                }
            }
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(err) = execute(args.command) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
