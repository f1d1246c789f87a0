use anchor_web::{DocRoot, Server};
use std::{env, net::Ipv4Addr, path::PathBuf, process};
use tokio::net::{TcpListener, TcpSocket};

const PORT: u16 = 8080;
const LISTEN_BACKLOG: u32 = 3;

#[tokio::main]
async fn main() {
    env_logger::init();

    let root_path = document_root();
    let doc_root = match DocRoot::open(&root_path) {
        Ok(root) => root,
        Err(err) => {
            log::error!("cannot open document root {}: {err}", root_path.display());
            process::exit(1);
        }
    };

    let listener = match bind(PORT) {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("cannot listen on port {PORT}: {err}");
            process::exit(1);
        }
    };

    log::info!("serving {} on port {PORT}", root_path.display());

    Server::builder()
        .listener(listener)
        .doc_root(doc_root)
        .build()
        .launch()
        .await;
}

/// The `public/` directory adjacent to the binary.
fn document_root() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("public")))
        .unwrap_or_else(|| PathBuf::from("public"))
}

fn bind(port: u16) -> std::io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind((Ipv4Addr::UNSPECIFIED, port).into())?;
    socket.listen(LISTEN_BACKLOG)
}
