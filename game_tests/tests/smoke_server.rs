use game_server::server::bind_ephemeral;

/// Smoke test: server can run a few ticks without panicking.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(64).await?;
    server.run_for_ticks(3).await?;
    assert_eq!(server.tick(), 3);
    assert_eq!(server.client_count(), 0);
    Ok(())
}

/// The console can stop a running server.
#[tokio::test]
async fn console_quit_stops_the_loop() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(64).await?;
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    server.set_console_input(rx);
    tx.send("status".to_string()).await?;
    tx.send("quit".to_string()).await?;
    server.run_for_ticks(1).await?;
    assert!(server.should_quit());
    Ok(())
}
