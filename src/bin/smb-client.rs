//! SMB2/3 Client CLI

use clap::{Parser, Subcommand};
use rust_smb_client::client::{Context, FileType, OpenFlags, StatVfs};
use rust_smb_client::SmbUrl;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "smb-client")]
#[command(about = "Rust SMB2/3 Client", long_about = None)]
struct Args {
    /// smb://[domain;][user@]server[/share[/path]]
    url: String,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Seconds to wait for the server
    #[arg(short = 't', long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List files in a directory
    Ls {
        /// Directory path to list
        #[arg(default_value = "")]
        path: String,
    },

    /// Download a file from the server
    Get {
        /// Remote file path
        remote: String,
        /// Local file path (optional, uses remote filename if not specified)
        local: Option<PathBuf>,
    },

    /// Upload a file to the server
    Put {
        /// Local file path
        local: PathBuf,
        /// Remote file path (optional, uses local filename if not specified)
        remote: Option<String>,
    },

    /// Display file information
    Stat { path: String },

    /// Create a directory
    Mkdir { path: String },

    /// Delete a file
    Rm { path: String },

    /// Delete an empty directory
    Rmdir { path: String },

    /// Rename a file or directory
    Mv { from: String, to: String },

    /// Show filesystem usage
    Df {
        #[arg(default_value = "")]
        path: String,
    },

    /// List the shares on the server
    Shares,
}

/// Resolve `arg` against the path from the URL
fn remote_path(url: &SmbUrl, arg: &str) -> String {
    match (&url.path, arg) {
        (_, arg) if arg.starts_with('/') => arg.to_string(),
        (Some(base), "") => base.clone(),
        (Some(base), arg) => format!("{}/{}", base, arg),
        (None, arg) => arg.to_string(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let local = tokio::task::LocalSet::new();
    local.run_until(run(args)).await
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::new();
    let url = ctx.parse_url(&args.url)?;
    let server = url.server.clone().unwrap_or_default();
    if let Some(domain) = &url.domain {
        ctx.set_domain(domain);
    }
    if let Some(user) = &url.user {
        ctx.set_user(user);
    }
    ctx.set_timeout(Some(std::time::Duration::from_secs(args.timeout)));

    tracing::info!("Connecting to {}", server);
    ctx.connect(&server)?;
    ctx.attach_tokio();

    if let Commands::Shares = args.command {
        let shares = ctx.share_enum().await?;
        for share in &shares.shares {
            println!("{:<20} {:#010x}  {}", share.name, share.share_type, share.comment);
        }
        ctx.disconnect_share().await?;
        return Ok(());
    }

    let share = url
        .share
        .clone()
        .ok_or("the URL names no share")?;
    ctx.attach_share(&share).await?;

    let result = execute(&ctx, &url, args.command).await;
    ctx.disconnect_share().await?;
    tracing::info!("Disconnected");
    result
}

async fn execute(
    ctx: &Context,
    url: &SmbUrl,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Ls { path } => {
            let path = remote_path(url, &path);
            let mut dir = ctx.opendir(&path).await?;
            while let Some(entry) = dir.read() {
                let kind = match entry.stat.file_type {
                    FileType::Directory => 'd',
                    FileType::Link => 'l',
                    FileType::File => '-',
                };
                println!(
                    "{} {:>12} {} {}",
                    kind,
                    entry.stat.size,
                    entry.stat.mtime.format("%Y-%m-%d %H:%M"),
                    entry.name
                );
            }
        }

        Commands::Get { remote, local } => {
            let remote = remote_path(url, &remote);
            let local_path = local.unwrap_or_else(|| {
                PathBuf::from(remote.rsplit('/').next().unwrap_or("download"))
            });
            tracing::info!("Downloading {} -> {}", remote, local_path.display());

            let handle = ctx.open(&remote, OpenFlags::READ).await?;
            let chunk_size = ctx.max_read_size() as usize;
            let mut data = Vec::new();
            loop {
                let chunk = handle.read(chunk_size).await?;
                if chunk.is_empty() {
                    break;
                }
                data.extend_from_slice(&chunk);
            }
            handle.close().await?;

            std::fs::write(&local_path, &data)?;
            tracing::info!("Downloaded {} bytes", data.len());
        }

        Commands::Put { local, remote } => {
            let remote = remote_path(
                url,
                &remote.unwrap_or_else(|| {
                    local
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("upload")
                        .to_string()
                }),
            );
            tracing::info!("Uploading {} -> {}", local.display(), remote);

            let data = std::fs::read(&local)?;
            let handle = ctx
                .open(&remote, OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)
                .await?;
            let mut offset = 0;
            while offset < data.len() {
                let written = handle.write(&data[offset..]).await?;
                if written == 0 {
                    return Err(format!("{}: server accepted no data", remote).into());
                }
                offset += written;
            }
            handle.close().await?;
            tracing::info!("Uploaded {} bytes", offset);
        }

        Commands::Stat { path } => {
            let path = remote_path(url, &path);
            let st = ctx.stat(&path).await?;
            println!("Path:     {}", path);
            println!("Type:     {:?}", st.file_type);
            println!("Size:     {}", st.size);
            println!("Inode:    {}", st.ino);
            println!("Links:    {}", st.nlink);
            println!("Access:   {}", st.atime);
            println!("Modify:   {}", st.mtime);
            println!("Change:   {}", st.ctime);
            println!("Birth:    {}", st.btime);
        }

        Commands::Mkdir { path } => ctx.mkdir(&remote_path(url, &path)).await?,
        Commands::Rm { path } => ctx.unlink(&remote_path(url, &path)).await?,
        Commands::Rmdir { path } => ctx.rmdir(&remote_path(url, &path)).await?,
        Commands::Mv { from, to } => {
            ctx.rename(&remote_path(url, &from), &remote_path(url, &to))
                .await?
        }

        Commands::Df { path } => {
            let vfs = ctx.statvfs(&remote_path(url, &path)).await?;
            let (size, used, avail) = df_columns(&vfs);
            println!("{:>16} {:>16} {:>16}", "Size", "Used", "Avail");
            println!("{:>16} {:>16} {:>16}", size, used, avail);
        }

        Commands::Shares => unreachable!("handled before attaching a share"),
    }
    Ok(())
}

/// Size, used and available bytes; server-supplied counts may be absurd
fn df_columns(vfs: &StatVfs) -> (u64, u64, u64) {
    let size = vfs.blocks.saturating_mul(vfs.frsize);
    let free = vfs.bfree.saturating_mul(vfs.frsize);
    let avail = vfs.bavail.saturating_mul(vfs.frsize);
    (size, size.saturating_sub(free), avail)
}
