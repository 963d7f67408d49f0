//! Interactive demo for the namespace browser.
//!
//! Reads one command per line from stdin and drives a `Browser` backed by a
//! seeded in-memory service:
//! 1. `connect [host]` opens the session and loads the root level
//! 2. `open`, `collapse`, `tree` walk the lazily loaded tree
//! 3. `get`, `edit`, `save`, `set`, `create`, `rm`, `rmr` work on nodes
//!
//! An optional first argument names a settings file; by default
//! `appsettings.json` beside the executable is used.

use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zk_browser::prelude::*;

const HELP: &str = "\
commands:
  connect [host]      connect (blank host uses the default)
  link <name>         connect to a quick link
  links               list quick links
  disconnect          close the session, remember the host
  state               show the session state
  reload              reload the tree from the root
  ls <path>           list children of a node
  open <path>         expand a node, fetching if needed
  collapse <path>     collapse a node
  tree                print the visible tree
  get <path>          select a node and show its data
  edit <value>        edit the selected node's value locally
  save                write the selected node's edited value
  set <path> <value>  write a node's value
  create <path>       create an empty node
  rm <path>           delete a node
  rmr <path>          delete a node and its children
  quit";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zk_browser=info".parse()?),
        )
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(Path::new(&path)),
        None => Settings::load_default(),
    };

    let connector = Arc::new(MemoryConnector::new(demo_service()));
    let (browser, updates) = BrowserBuilder::new(connector).settings(settings).build();
    tokio::spawn(log_updates(updates));

    println!("=== Namespace Browser Demo ===");
    println!("Backed by an in-memory service. Type `help` for commands.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !run_command(&browser, line.trim()).await {
                    break;
                }
            }
        }
    }

    browser.disconnect().await;
    println!("\nDone!");
    Ok(())
}

fn demo_service() -> MemoryService {
    let service = MemoryService::new();
    service.put("/zookeeper/quota", "");
    service.put("/app/config/database", r#"{"url": "postgres://db:5432/app"}"#);
    service.put("/app/config/Features", "beta=true");
    service.put("/app/locks", "");
    service.put("/services/api/instance-1", "10.0.0.11:8080");
    service.put("/services/api/instance-2", "10.0.0.12:8080");
    service
}

async fn log_updates(mut rx: broadcast::Receiver<TreeUpdate>) {
    loop {
        match rx.recv().await {
            Ok(update) => tracing::debug!(
                "Tree update {:?} at {}: {} keys",
                update.kind,
                update.key,
                update.keys.len()
            ),
            Err(broadcast::error::RecvError::Lagged(count)) => {
                tracing::warn!("Tree listener lagged behind by {} updates", count);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Run one command line. Returns `false` when the demo should exit.
async fn run_command(browser: &Browser, line: &str) -> bool {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let result = match command {
        "" => Ok(()),
        "quit" | "exit" => return false,
        "help" => {
            println!("{HELP}");
            Ok(())
        }
        "connect" => browser.connect(rest).await,
        "link" => match browser.quick_links().iter().find(|l| l.name == rest) {
            Some(link) => browser.connect(&link.host).await,
            None => {
                println!("no quick link named {rest:?}");
                Ok(())
            }
        },
        "links" => {
            for link in browser.quick_links() {
                println!("{}\t{}", link.name, link.host);
            }
            Ok(())
        }
        "disconnect" => {
            browser.disconnect().await;
            Ok(())
        }
        "state" => {
            println!("{}", browser.connection_state().await);
            Ok(())
        }
        "reload" => browser.model().expand("/").await.map(|_| ()),
        "ls" => browser.list_children(rest).await.map(|children| {
            for child in children {
                let marker = if child.has_children() { "+" } else { " " };
                println!("{marker} {}", child.name);
            }
        }),
        "open" => browser.model().open(rest).await,
        "collapse" => {
            browser.model().collapse(rest).await;
            Ok(())
        }
        "tree" => {
            print_tree(browser).await;
            Ok(())
        }
        "get" => browser.select(rest).await.map(|detail| print_detail(&detail)),
        "edit" => {
            match browser.model().edit_selected(rest).await {
                Some(detail) => print_detail(&detail),
                None => println!("no node selected"),
            }
            Ok(())
        }
        "save" => browser.save_selected().await.map(|saved| {
            println!("{}", if saved { "Data updated." } else { "nothing to save" });
        }),
        "set" => match rest.split_once(char::is_whitespace) {
            Some((path, value)) => browser.set_node(path, value.trim()).await,
            None => browser.set_node(rest, "").await,
        },
        "create" => browser.create_node(rest).await,
        "rm" => browser.delete_node(rest).await,
        "rmr" => browser.delete_node_recursive(rest).await,
        other => {
            println!("unknown command {other:?}, try `help`");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
    }
    true
}

async fn print_tree(browser: &Browser) {
    let tree = browser.model().tree();
    let tree = tree.read().await;
    for (depth, node) in tree.visible_rows() {
        let marker = if node.is_leaf {
            " "
        } else if tree.is_expanded(&node.key) {
            "-"
        } else {
            "+"
        };
        println!("{}{marker} {}", "  ".repeat(depth), node.title);
    }
}

fn print_detail(detail: &NodeDetail) {
    let dirty = if detail.dirty { " (modified)" } else { "" };
    println!("{}{dirty}", detail.path);
    if let Some(stat) = &detail.stat {
        println!("  Create Time : {}", stat.created_display());
        println!("  Modify Time : {}", stat.modified_display());
        println!("  Version     : {}", stat.version);
        println!("  ACL Version : {}", stat.acl_version);
        println!("  Children    : {}", stat.num_children);
        if stat.is_ephemeral() {
            println!("  Ephemeral   : {:#x}", stat.ephemeral_owner_id);
        }
    }
    if detail.raw_value.is_empty() {
        println!("  <no data>");
    } else {
        println!("  {}", detail.raw_value);
    }
}
