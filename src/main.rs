use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mingit::hash::ObjectId;
use mingit::object::ObjectType;
use mingit::repository::{Config, Repository};
use mingit::tree::TreeEntry;
use mingit::{clone as clone_mod, codec, http, snapshot, tree, worktree};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository in the current directory
    Init,

    /// Provide content or type information for a stored object
    CatFile {
        /// Pretty-print the object's content
        #[arg(short = 'p')]
        pretty_print: bool,

        /// Show the object's type
        #[arg(short = 't', conflicts_with = "pretty_print")]
        type_only: bool,

        /// Object id
        object: String,
    },

    /// Compute an object id and optionally store it
    HashObject {
        /// Write the object into the object database
        #[arg(short)]
        write: bool,

        file: PathBuf,
    },

    /// List the contents of a tree object
    LsTree {
        #[arg(long)]
        name_only: bool,

        tree: String,
    },

    /// Snapshot the working directory into a tree object
    WriteTree,

    /// Write a commit object
    CommitTree {
        tree: String,

        #[arg(short = 'p')]
        parent: Option<String>,

        #[arg(short = 'm')]
        message: String,
    },

    /// Clone a repository over smart HTTP
    Clone {
        url: String,
        directory: PathBuf,

        #[arg(long)]
        branch: Option<String>,
    },
}

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init(),
        Commands::CatFile { pretty_print, type_only, object } => {
            cmd_cat_file(&object, pretty_print, type_only)
        }
        Commands::HashObject { write, file } => cmd_hash_object(&file, write),
        Commands::LsTree { name_only, tree } => cmd_ls_tree(&tree, name_only),
        Commands::WriteTree => cmd_write_tree(),
        Commands::CommitTree { tree, parent, message } => cmd_commit_tree(&tree, parent, &message),
        Commands::Clone { url, directory, branch } => cmd_clone(&url, &directory, branch),
    }
}

fn cmd_init() -> anyhow::Result<()> {
    Repository::init(std::env::current_dir()?)?;
    println!("Initialized empty repository");
    Ok(())
}

fn parse_id(text: &str) -> anyhow::Result<ObjectId> {
    ObjectId::from_hex(text).ok_or_else(|| anyhow::anyhow!("not a valid object id: {text:?}"))
}

fn cmd_cat_file(object: &str, pretty_print: bool, type_only: bool) -> anyhow::Result<()> {
    let repo = Repository::discover(std::env::current_dir()?)?;
    let id = parse_id(object)?;
    let (kind, payload) = repo.read_object(id)?;

    if type_only {
        println!("{kind}");
    } else if pretty_print {
        match kind {
            ObjectType::Tree => {
                for entry in tree::parse(&payload)? {
                    println!("{} {} {}\t{}", entry.mode.padded_octal(), mode_kind(&entry), entry.id, entry.name);
                }
            }
            _ => std::io::Write::write_all(&mut std::io::stdout(), &payload)?,
        }
    }

    Ok(())
}

fn mode_kind(entry: &TreeEntry) -> &'static str {
    if entry.mode.is_tree() {
        "tree"
    } else {
        "blob"
    }
}

fn cmd_hash_object(file: &PathBuf, write: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)?;

    let id = if write {
        let repo = Repository::discover(std::env::current_dir()?)?;
        repo.objects.write(ObjectType::Blob, &bytes)?
    } else {
        let (id, _) = codec::frame(ObjectType::Blob, &bytes);
        id
    };

    println!("{id}");
    Ok(())
}

fn cmd_ls_tree(tree_id: &str, name_only: bool) -> anyhow::Result<()> {
    let repo = Repository::discover(std::env::current_dir()?)?;
    let id = parse_id(tree_id)?;
    let entries = tree::read(&repo.objects, id)?;

    for entry in entries {
        if name_only {
            println!("{}", entry.name);
        } else {
            println!("{} {} {}\t{}", entry.mode.padded_octal(), mode_kind(&entry), entry.id, entry.name);
        }
    }

    Ok(())
}

fn cmd_write_tree() -> anyhow::Result<()> {
    let repo = Repository::discover(std::env::current_dir()?)?;
    let id = snapshot::snapshot(&repo.objects, repo.worktree_path())?;
    println!("{id}");
    Ok(())
}

fn cmd_commit_tree(tree_id: &str, parent: Option<String>, message: &str) -> anyhow::Result<()> {
    let repo = Repository::discover(std::env::current_dir()?)?;
    let config = Config::from_env();

    let tree = parse_id(tree_id)?;
    let parent = parent.map(|p| parse_id(&p)).transpose()?;

    let commit_id = repo.commit_tree(&config, tree, parent, message)?;
    println!("{commit_id}");
    Ok(())
}

fn cmd_clone(url: &str, directory: &PathBuf, branch: Option<String>) -> anyhow::Result<()> {
    std::fs::create_dir_all(directory)?;
    let repo = Repository::init(directory)?;

    let transport = http::HttpTransport::new(url);
    let reference = match &branch {
        Some(branch) => clone_mod::Reference::Branch(branch),
        None => clone_mod::Reference::Head,
    };

    let cloned = clone_mod::clone(&transport, &repo.objects, reference)?;

    for (name, id) in &cloned.refs {
        if name != "HEAD" {
            repo.write_ref(name, *id)?;
        }
    }

    let head_branch = branch
        .or_else(|| {
            cloned
                .refs
                .iter()
                .find(|(name, id)| name.starts_with("refs/heads/") && **id == cloned.head)
                .map(|(name, _)| name.trim_start_matches("refs/heads/").to_string())
        });

    match head_branch {
        Some(branch) => std::fs::write(
            repo.git_dir.join("HEAD"),
            format!("ref: refs/heads/{branch}\n"),
        )?,
        None => repo.write_ref("HEAD", cloned.head)?,
    }

    worktree::materialize(&repo.objects, cloned.head, repo.worktree_path())?;

    println!("Cloned into {}", directory.display());
    Ok(())
}
