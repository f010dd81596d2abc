//! Interactive operator shell.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use sha3::{Digest, Sha3_512};
use skein_core::{RemoteNode, SwarmId};
use skein_net::{ContentStore, FileStore, NodePool, VirtualNode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

const HELP: &str = "Available commands:
hl, host, host-local file_path - host local file from file_path
jr, join-remote file_id file_path - join remote swarm with file_id and download file to file_path
lvn, ls, list-virtual-nodes - list hosted virtual nodes
h, help - print this help message
e, q, exit - exit program";

pub struct Shell {
    pool: Arc<NodePool>,
}

impl Shell {
    pub fn new(pool: Arc<NodePool>) -> Self {
        Self { pool }
    }

    /// Read commands from stdin until `exit` or EOF.
    pub async fn run(&self) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("Enter commands:");
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if matches!(line, "exit" | "e" | "q") {
                        break;
                    }
                    if !line.is_empty() {
                        self.handle(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("stdin read failed: {e}");
                    break;
                }
            }
        }
    }

    fn handle(&self, line: &str) {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();
        match (name, args.len()) {
            ("host-local" | "hl" | "host", 1) => self.host_local_file(args[0]),
            ("join-remote" | "jr", 2) => self.join_remote(args[0], args[1]),
            ("list-virtual-nodes" | "lvn" | "ls", 0) => self.list_virtual_nodes(),
            ("help" | "h", 0) => println!("{HELP}"),
            _ => println!("Unknown command. Type \"help\" to get a list of available commands."),
        }
    }

    /// Host an existing file; its SHA3-512 becomes the virtual node's id.
    pub fn host_local_file(&self, path: &str) {
        match FileStore::open(Path::new(path)) {
            Ok(store) => self.host_store(store),
            Err(e) => error!("cannot open {path}: {e}"),
        }
    }

    /// Host 64 random bytes from a temporary file.
    pub fn host_random_blob(&self) {
        use rand::RngCore;
        let mut blob = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut blob);
        let mut tmp = match tempfile::NamedTempFile::new() {
            Ok(tmp) => tmp,
            Err(e) => {
                error!("cannot create temporary file: {e}");
                return;
            }
        };
        if let Err(e) = tmp.write_all(&blob) {
            error!("cannot write temporary file: {e}");
            return;
        }
        let name = tmp.path().display().to_string();
        match tmp.keep() {
            Ok((file, _path)) => self.host_store(FileStore::from_file(file, name)),
            Err(e) => error!("cannot keep temporary file: {e}"),
        }
    }

    fn host_store(&self, mut store: FileStore) {
        let data = match store.read_all() {
            Ok(data) => data,
            Err(e) => {
                error!("cannot read {}: {e}", store.name());
                return;
            }
        };
        let id = content_id(&data);
        let name = store.name().to_string();
        let node = VirtualNode::new(id, Box::new(store), true);
        match self.pool.host_virtual_node(node) {
            Ok(_) => println!("added virtual node for {name}: {}", id.to_hex()),
            Err(e) => error!("{e}"),
        }
    }

    /// Join the swarm for `id_hex`, saving fetched content to `path`.
    pub fn join_remote(&self, id_hex: &str, path: &str) {
        let id = match SwarmId::from_hex(id_hex) {
            Ok(id) => id,
            Err(e) => {
                error!("{e}");
                return;
            }
        };
        let store = match FileStore::create(Path::new(path)) {
            Ok(store) => store,
            Err(e) => {
                error!("cannot create {path}: {e}");
                return;
            }
        };
        let node = VirtualNode::new(id, Box::new(store), false);
        match self.pool.host_virtual_node(node) {
            Ok(_) => println!("joined swarm for {path}: {}", id.to_hex()),
            Err(e) => error!("{e}"),
        }
    }

    fn list_virtual_nodes(&self) {
        for node in self.pool.hosted_nodes() {
            let s = node.summary();
            println!(
                "{} file: {}, has content: {}",
                s.id.to_hex(),
                s.content_name,
                s.has_content
            );
            println!(
                "predecessor: {}, successor: {}",
                fmt_opt(&s.predecessor),
                fmt_opt(&s.successor)
            );
            for (i, finger) in s.fingers.iter().enumerate() {
                println!("{i}: {}", fmt_opt(finger));
            }
            for address in &s.swarm {
                println!("\t{address}");
            }
        }
    }
}

fn fmt_opt(node: &Option<RemoteNode>) -> String {
    match node {
        Some(node) => node.to_string(),
        None => "none".to_string(),
    }
}

fn content_id(data: &[u8]) -> SwarmId {
    let digest = Sha3_512::digest(data);
    let mut bytes = [0u8; 64];
    bytes.copy_from_slice(&digest);
    SwarmId(bytes)
}
