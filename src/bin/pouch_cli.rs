//! `pouch-cli`: a small companion binary for generating Ed448 key material
//! and issuing one signed command over a raw TCP connection, grounded in
//! the reference SDK's key-generation and auth-handshake helpers.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use pouchd::auth::{new_seed_hex, public_key_hex_from_seed, sign_with_seed_as_hex};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("genseed") => genseed(),
        Some("genkeypair") => genkeypair(&args[2..]),
        Some("connect") => connect(&args[2..]),
        _ => {
            eprintln!("usage: pouch-cli <genseed|genkeypair --seed <hex>|connect --url <addr> --client-id <id> --seed <hex>>");
            std::process::exit(2);
        }
    }
}

fn genseed() {
    println!("{}", new_seed_hex());
}

fn genkeypair(args: &[String]) {
    let seed = flag_value(args, "--seed").unwrap_or_else(|| {
        eprintln!("genkeypair requires --seed <hex>");
        std::process::exit(2);
    });
    match public_key_hex_from_seed(&seed) {
        Ok(pubkey) => println!("{pubkey}"),
        Err(e) => {
            eprintln!("failed to derive public key: {e}");
            std::process::exit(1);
        }
    }
}

fn connect(args: &[String]) {
    let url = flag_value(args, "--url").unwrap_or_else(|| {
        eprintln!("connect requires --url <host:port>");
        std::process::exit(2);
    });
    let client_id = flag_value(args, "--client-id").unwrap_or_else(|| {
        eprintln!("connect requires --client-id <id>");
        std::process::exit(2);
    });
    let seed = flag_value(args, "--seed").unwrap_or_else(|| {
        eprintln!("connect requires --seed <hex>");
        std::process::exit(2);
    });

    let stream = TcpStream::connect(&url).unwrap_or_else(|e| {
        eprintln!("failed to connect to {url}: {e}");
        std::process::exit(1);
    });
    let mut writer = stream.try_clone().expect("clone stream");
    let mut reader = BufReader::new(stream);

    let mut challenge_line = String::new();
    reader
        .read_line(&mut challenge_line)
        .expect("read challenge");
    let challenge_hex = challenge_line
        .trim()
        .strip_prefix("AUTH.CHALLENGE.REQ ")
        .unwrap_or_else(|| {
            eprintln!("unexpected server greeting: {challenge_line}");
            std::process::exit(1);
        });

    let signature_hex = sign_with_seed_as_hex(&seed, challenge_hex.as_bytes())
        .unwrap_or_else(|e| {
            eprintln!("failed to sign challenge: {e}");
            std::process::exit(1);
        });

    writeln!(writer, "AUTH.CHALLENGE.RES {client_id} {signature_hex}").expect("write auth response");

    let mut auth_reply = String::new();
    reader.read_line(&mut auth_reply).expect("read auth reply");
    println!("{}", auth_reply.trim_end());
    if !auth_reply.trim().starts_with("OK") {
        std::process::exit(1);
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.expect("read stdin");
        if line.is_empty() {
            continue;
        }
        writeln!(writer, "{line}").expect("write command");
        let mut reply = String::new();
        reader.read_line(&mut reply).expect("read reply");
        print!("{reply}");
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
