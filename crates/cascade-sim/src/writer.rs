//! JSON-lines history writer.
//!
//! Runs as its own task, draining snapshots from the channel sink and
//! appending one JSON object per line. The tick loop never waits on it;
//! if it falls behind, the channel sink drops entries and counts them.

use std::path::PathBuf;

use cascade_types::Snapshot;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SimError;

/// Spawn the writer. The task ends when every sender is dropped and
/// returns the number of snapshots written.
pub fn spawn_history_writer(
    mut rx: mpsc::Receiver<Snapshot>,
    path: PathBuf,
) -> JoinHandle<Result<u64, SimError>> {
    tokio::spawn(async move {
        let file = File::create(&path).await?;
        let mut out = BufWriter::new(file);
        let mut written: u64 = 0;
        while let Some(snapshot) = rx.recv().await {
            let mut line = serde_json::to_vec(&snapshot)?;
            line.push(b'\n');
            out.write_all(&line).await?;
            written = written.saturating_add(1);
            debug!(tick = snapshot.tick, "History line written");
        }
        out.flush().await?;
        info!(path = %path.display(), written, "History output closed");
        Ok(written)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn snapshot(tick: u64) -> Snapshot {
        Snapshot {
            tick,
            erosion_factor: 1.0,
            modules: Vec::new(),
            edges: Vec::new(),
            phases: BTreeMap::new(),
            actions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn writes_one_line_per_snapshot() {
        let path = std::env::temp_dir().join(format!(
            "cascade-history-{}.jsonl",
            std::process::id()
        ));
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_history_writer(rx, path.clone());
        for tick in 0..3 {
            tx.send(snapshot(tick)).await.unwrap();
        }
        drop(tx);
        assert_eq!(handle.await.unwrap().unwrap(), 3);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let ticks: Vec<u64> = contents
            .lines()
            .map(|l| serde_json::from_str::<Snapshot>(l).unwrap().tick)
            .collect();
        assert_eq!(ticks, vec![0, 1, 2]);
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
