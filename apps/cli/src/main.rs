use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use pagesmith_compiler::{
    pre_bundle, CommandCompiler, Compile, PassthroughCompiler, ShadowCompiler, TargetVersion,
};
use pagesmith_project::{Node, ProjectStore};

#[derive(Parser)]
#[command(
    name = "pagesmith-cli",
    about = "Headless utilities for Pagesmith project stores",
    author,
    version
)]
struct Cli {
    /// 專案存放目錄；預設為目前目錄。 / Project store directory (defaults to the current directory).
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 建立新專案。 / Create a new project seeded with the starter tree.
    New(NewArgs),
    /// 列出所有專案。 / List stored projects.
    List,
    /// 顯示專案的中繼資料與樹。 / Print a project's metadata and tree.
    Show(ProjectArgs),
    /// 為所有隱藏副本重新編譯指定目標版本。 / Recompile every hidden companion for a target version.
    Recompile(RecompileArgs),
    /// 輸出送往打包器的虛擬模組對應。 / Print the virtual-module map sent to the bundler.
    BundlePlan(ProjectArgs),
}

#[derive(Args)]
struct NewArgs {
    /// 專案名稱。 / Project name.
    #[arg(long, default_value = "untitled")]
    name: String,
    /// 注入目標頁面的網址。 / URL of the page the project targets.
    #[arg(long)]
    url: String,
}

#[derive(Args)]
struct ProjectArgs {
    /// 專案識別碼。 / Project id.
    id: i64,
}

#[derive(Args)]
struct RecompileArgs {
    /// 專案識別碼。 / Project id.
    id: i64,
    /// 目標版本（es5、es2015、es2020、esnext）。 / Target version.
    #[arg(long, default_value = "esnext")]
    target: String,
    /// 外部轉譯指令；省略時不做語法降階。 / External transpiler command; omitted means passthrough.
    #[arg(long, value_name = "PROGRAM")]
    compiler: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let store_dir = cli.store.unwrap_or_else(|| PathBuf::from("."));
    let store = ProjectStore::new(&store_dir);

    match cli.command {
        Commands::New(args) => {
            let record = store
                .create(&args.name, &args.url)
                .context("could not create the project")?;
            println!("created project {} ({})", record.id, record.name);
        }
        Commands::List => {
            for record in store.list().context("could not list the store")? {
                println!("{}\t{}\t{}", record.id, record.name, record.url);
            }
        }
        Commands::Show(args) => {
            let record = store
                .get(args.id)?
                .ok_or_else(|| anyhow!("project {} not found", args.id))?;
            println!("{} ({})", record.name, record.url);
            let tree = record
                .tree
                .ok_or_else(|| anyhow!("project {} has no tree", args.id))?;
            let mut out = String::new();
            render_node(&tree.root, 0, &mut out);
            print!("{out}");
        }
        Commands::Recompile(args) => {
            let version = TargetVersion::parse(&args.target)
                .ok_or_else(|| anyhow!("unknown target version '{}'", args.target))?;
            let companions = match args.compiler {
                Some(program) => {
                    recompile(&store, args.id, version, CommandCompiler::new(program))?
                }
                None => recompile(&store, args.id, version, PassthroughCompiler)?,
            };
            println!("recompiled {companions} companions for {version}");
        }
        Commands::BundlePlan(args) => {
            let record = store
                .get(args.id)?
                .ok_or_else(|| anyhow!("project {} not found", args.id))?;
            let tree = record
                .tree
                .ok_or_else(|| anyhow!("project {} has no tree", args.id))?;
            let plan = pre_bundle(&tree.flatten());
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }
    Ok(())
}

/// Backfills missing companions, recompiles them for `version` and stores
/// the updated record. Returns the companion count.
fn recompile<C: Compile>(
    store: &ProjectStore,
    id: i64,
    version: TargetVersion,
    compiler: C,
) -> Result<usize> {
    let mut record = store
        .get(id)?
        .ok_or_else(|| anyhow!("project {id} not found"))?;
    let tree = record
        .tree
        .take()
        .ok_or_else(|| anyhow!("project {id} has no tree"))?;
    let shadow = ShadowCompiler::new(compiler);
    let tree = shadow.ensure_companions(&tree, version);
    let tree = shadow.on_version_change(&tree, version);
    let companions = tree.flatten().iter().filter(|f| f.id.is_shadow()).count();
    record.tree = Some(tree);
    store.update(&record).context("could not store the project")?;
    Ok(companions)
}

fn render_node(node: &Node, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let marker = if node.is_folder() { "/" } else { "" };
    let hidden = if node.hidden { " (hidden)" } else { "" };
    out.push_str(&format!("{indent}{}{marker}{hidden}\n", node.name));
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}
