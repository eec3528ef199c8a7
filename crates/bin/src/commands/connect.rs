//! Connect command - a headless client that prints session activity and sends chat.

use rosetta::sync::{Client, ClientConfig, ClientEvent};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{checksum::checksum_or_default, cli::ConnectArgs};

/// Log in, then relay stdin lines as chat messages until either side hangs up
pub async fn run(args: &ConnectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::new(args.username.clone())
        .with_password(args.password.clone())
        .with_checksum(checksum_or_default(args.jar.as_deref())?);
    let address = format!("{}:{}", args.host, args.port);

    let mut client = Client::connect(address.as_str(), config).await?;
    println!("Connected to {address} as {}", client.username());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = client.next_event() => match event {
                Some(ClientEvent::MappingsSynced { count }) => println!("* Received {count} mappings"),
                Some(ClientEvent::Message(message)) => println!("{message}"),
                Some(ClientEvent::UserList(users)) => println!("* Online: {}", users.join(", ")),
                Some(ClientEvent::EntryChanged { change, .. }) => tracing::debug!("{change}"),
                Some(ClientEvent::Kicked(reason)) => eprintln!("Kicked: {reason}"),
                Some(ClientEvent::Disconnected) | None => {
                    println!("Disconnected");
                    return Ok(());
                }
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if !line.trim().is_empty() => client.send_message(line).await?,
                Some(_) => {}
                None => stdin_open = false,
            },
        }
        if !stdin_open {
            break;
        }
    }

    client.disconnect().await;
    println!("Disconnected");
    Ok(())
}
