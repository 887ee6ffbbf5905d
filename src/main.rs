use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::Result;
use issueview::app::{self, App, ListOptions, ListTarget};
use issueview::config::Config;
use issueview::model::Priority;
use issueview::view::{DisplayProperty, GroupBy, IssueLayout, OrderBy};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "iv")]
#[command(about = "Grouped, filtered issue views with optimistic updates")]
#[command(version)]
struct Args {
  /// Path to config file (default: $IV_CONFIG, ./issueview.yaml, then $XDG_CONFIG_HOME/issueview/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Project id to use
  #[arg(short, long)]
  project: Option<String>,

  /// Serve issues from a JSON fixture instead of the API
  #[arg(long)]
  fixture: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print a grouped view of issues
  List(ListArgs),
  /// Update fields of an issue, e.g. `iv set <id> priority=high labels=bug,ui`
  Set {
    issue: String,
    #[arg(required = true)]
    assignments: Vec<String>,
  },
  /// Move an issue to another group of the project view
  Move {
    issue: String,
    /// Destination group key, `none` for the "None" group
    #[arg(long)]
    to: String,
    #[arg(long)]
    group_by: Option<GroupBy>,
  },
  /// Create an issue in the current project
  Create {
    name: String,
    #[arg(long, default_value = "none")]
    priority: Priority,
  },
  /// Delete an issue
  Delete { issue: String },
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
  #[arg(long, conflicts_with_all = ["module", "view", "mine", "user"])]
  cycle: Option<String>,
  #[arg(long, conflicts_with_all = ["view", "mine", "user"])]
  module: Option<String>,
  #[arg(long, conflicts_with_all = ["mine", "user"])]
  view: Option<String>,
  /// Issues assigned to you across the workspace
  #[arg(long, conflicts_with = "user")]
  mine: bool,
  /// Issues assigned to a user across the workspace
  #[arg(long)]
  user: Option<String>,

  #[arg(long)]
  layout: Option<IssueLayout>,
  /// Field to group by, or `none`
  #[arg(long)]
  group_by: Option<String>,
  /// e.g. `priority`, `-created_at`
  #[arg(long, allow_hyphen_values = true)]
  order_by: Option<OrderBy>,
  /// Filter as key=value[,value], repeatable
  #[arg(long = "filter")]
  filters: Vec<String>,
  #[arg(long)]
  show_empty: bool,
  /// Hide a display property, repeatable
  #[arg(long)]
  hide: Vec<DisplayProperty>,
}

impl ListArgs {
  fn target(&self) -> ListTarget {
    if let Some(cycle) = &self.cycle {
      ListTarget::Cycle(cycle.clone())
    } else if let Some(module) = &self.module {
      ListTarget::Module(module.clone())
    } else if let Some(view) = &self.view {
      ListTarget::View(view.clone())
    } else if self.mine {
      ListTarget::Mine
    } else if let Some(user) = &self.user {
      ListTarget::User(user.clone())
    } else {
      ListTarget::Project
    }
  }

  fn options(&self) -> Result<ListOptions> {
    let group_by = self
      .group_by
      .as_deref()
      .map(app::parse_group_by)
      .transpose()?;
    let filters = self
      .filters
      .iter()
      .map(|f| app::parse_filter(f))
      .collect::<Result<Vec<_>>>()?;
    Ok(ListOptions {
      layout: self.layout,
      group_by,
      order_by: self.order_by,
      filters,
      show_empty_groups: self.show_empty,
      hide: self.hide.clone(),
    })
  }
}

/// Log to a daily file so stdout only carries command output.
fn init_tracing() -> Option<WorkerGuard> {
  let dir = dirs::data_dir()?.join("issueview").join("logs");
  let appender = tracing_appender::rolling::daily(dir, "iv.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_env("IV_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _guard = init_tracing();

  let args = Args::parse();

  // Load configuration; a fixture run works without a config file
  let config = match (Config::load(args.config.as_deref()), &args.fixture) {
    (Ok(config), _) => config,
    (Err(_), Some(_)) if args.config.is_none() => Config::default(),
    (Err(e), _) => return Err(e),
  };

  // Override project if specified on command line
  let config = if let Some(project) = args.project {
    Config {
      default_project: Some(project),
      ..config
    }
  } else {
    config
  };

  let mut app = App::new(config, args.fixture.as_deref())?;

  match args.command {
    Command::List(list) => {
      let out = app.list(list.target(), list.options()?).await?;
      print!("{}", out);
    }
    Command::Set { issue, assignments } => {
      let updated = app.set(&issue, &assignments).await?;
      println!("Updated #{} {}", updated.sequence_id, updated.name);
    }
    Command::Move {
      issue,
      to,
      group_by,
    } => match app.move_issue(&issue, &to, group_by).await? {
      Some(moved) => println!("Moved #{} {} to {}", moved.sequence_id, moved.name, to),
      None => println!("Issue {} is already in {}", issue, to),
    },
    Command::Create { name, priority } => {
      let created = app.create(&name, priority).await?;
      println!("Created #{} {} ({})", created.sequence_id, created.name, created.id);
    }
    Command::Delete { issue } => {
      app.delete(&issue).await?;
      println!("Deleted {}", issue);
    }
  }

  Ok(())
}
