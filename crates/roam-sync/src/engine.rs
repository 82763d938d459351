use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use roam_stream::{merge_streams, EntryId, EventLog, EventStream, EventStreamEntry};
use roam_tree::{AdvanceOutcome, EventStreamHandler, Identifiable, NomadFolder, TreeError};
use roam_types::SourceAddress;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::publish::HeadPublisher;
use crate::transport::SourceTransport;

/// Counts from one pull.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Sources whose streams were read.
    pub sources: usize,
    /// Sources skipped because their published head had not moved.
    pub unchanged: usize,
    /// Entries received across all sources.
    pub fetched: usize,
    /// Entries dropped before dispatch: failed integrity or wrong source.
    pub rejected: usize,
    /// Entries merged into a node.
    pub applied: usize,
    /// Entries that only moved a handler's position.
    pub seeded: usize,
    /// Entries already observed.
    pub duplicates: usize,
    /// Entries with no handler in the tree.
    pub ignored: usize,
    /// Remote entries kept for the next pull because their target is not
    /// in the tree yet.
    pub pending: usize,
    /// Entries whose dispatch failed.
    pub failed: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: &AdvanceOutcome) {
        match outcome {
            AdvanceOutcome::Applied(_) => self.applied += 1,
            AdvanceOutcome::Seeded => self.seeded += 1,
            AdvanceOutcome::Duplicate => self.duplicates += 1,
            AdvanceOutcome::Ignored => self.ignored += 1,
        }
    }
}

/// Pulls peer streams into a tree and publishes the local head.
pub struct SyncEngine {
    config: SyncConfig,
    transport: Arc<dyn SourceTransport>,
    heads: Arc<dyn HeadPublisher>,
    /// Last entry pulled per remote source.
    pulled: Mutex<HashMap<SourceAddress, EntryId>>,
    /// Remote entries that arrived before their target, in delivery order.
    pending: Mutex<Vec<EventStreamEntry>>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn SourceTransport>,
        heads: Arc<dyn HeadPublisher>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            heads,
            pulled: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fetch the stream of every source `root` listens to and replay the
    /// merged entries into the tree.
    ///
    /// The local source is read from the tree's own log. Remote sources are
    /// fetched incrementally after the last entry pulled from them. Remote
    /// entries whose target is not in the tree yet are kept and offered
    /// again on every later pull, merged in order with the new entries.
    pub async fn pull(
        &self,
        root: &NomadFolder,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        let log = root.context().log();
        let mut streams = Vec::new();

        for source in root.sources() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let entries = if source == *log.source() {
                log.entries().await?
            } else {
                match self.fetch(&source, cancel).await? {
                    Some(entries) => entries,
                    None => {
                        report.unchanged += 1;
                        continue;
                    }
                }
            };
            report.sources += 1;
            report.fetched += entries.len();
            streams.push(self.collect(source, entries, &mut report));
        }

        let heads: Vec<(SourceAddress, EntryId)> = streams
            .iter()
            .filter(|stream| stream.source() != log.source())
            .filter_map(|stream| Some((stream.source().clone(), stream.head()?.id)))
            .collect();
        streams.extend(self.pending_streams()?);

        let mut pending = Vec::new();
        for entry in merge_streams(&streams) {
            match root.dispatch(&entry, cancel).await {
                Ok(outcome) => {
                    report.record(&outcome);
                    if outcome == AdvanceOutcome::Ignored && entry.source != *log.source() {
                        pending.push(entry);
                    }
                }
                Err(TreeError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(entry = %entry.id, target = %entry.target_id, error = %e, "dispatch failed");
                    report.failed += 1;
                }
            }
        }

        if pending.len() > self.config.max_pending {
            let dropped = pending.len() - self.config.max_pending;
            warn!(dropped, "pending entries over limit, dropping the oldest");
            pending.drain(..dropped);
        }
        report.pending = pending.len();
        *self.pending.lock().expect("lock poisoned") = pending;

        self.pulled.lock().expect("lock poisoned").extend(heads);

        info!(
            root = root.id(),
            sources = report.sources,
            unchanged = report.unchanged,
            fetched = report.fetched,
            applied = report.applied,
            pending = report.pending,
            duplicates = report.duplicates,
            rejected = report.rejected,
            failed = report.failed,
            "pull complete"
        );
        Ok(report)
    }

    /// Reset the tree and replay every source from the beginning.
    pub async fn resync(
        &self,
        root: &NomadFolder,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncReport> {
        root.reset(cancel).await?;
        self.pulled.lock().expect("lock poisoned").clear();
        self.pending.lock().expect("lock poisoned").clear();
        info!(root = root.id(), "tree reset, replaying all sources");
        self.pull(root, cancel).await
    }

    /// Publish the head of `log`. Returns the published id, or `None` for an
    /// empty log.
    pub async fn publish(&self, log: &dyn EventLog) -> SyncResult<Option<EntryId>> {
        let Some(head) = log.head().await? else {
            return Ok(None);
        };
        self.heads.publish_head(log.source(), head.id).await?;
        debug!(source = %log.source(), head = %head.id, "published head");
        Ok(Some(head.id))
    }

    /// Fetch new entries of a remote source, or `None` when its published
    /// head is the entry pulled last time.
    async fn fetch(
        &self,
        source: &SourceAddress,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<Vec<EventStreamEntry>>> {
        let since = self.pulled.lock().expect("lock poisoned").get(source).copied();
        if self.config.skip_unchanged && since.is_some() {
            let published = self.heads.resolve_head(source).await?;
            if published.is_some() && published == since {
                debug!(source = %source, "head unchanged, skipping");
                return Ok(None);
            }
        }

        let fetch = self.transport.fetch_entries(source, since.as_ref());
        let after = self.config.fetch_timeout;
        tokio::select! {
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            fetched = tokio::time::timeout(after, fetch) => match fetched {
                Ok(entries) => entries.map(Some),
                Err(_) => Err(SyncError::Timeout { peer: source.clone(), after }),
            },
        }
    }

    /// Entries kept by earlier pulls, one stream per source.
    fn pending_streams(&self) -> SyncResult<Vec<EventStream>> {
        let pending = self.pending.lock().expect("lock poisoned").clone();
        let mut streams: Vec<EventStream> = Vec::new();
        for entry in pending {
            let index = match streams.iter().position(|s| *s.source() == entry.source) {
                Some(index) => index,
                None => {
                    streams.push(EventStream::new(entry.source.clone()));
                    streams.len() - 1
                }
            };
            streams[index].append(entry)?;
        }
        Ok(streams)
    }

    /// Build the stream of `source`, dropping entries that fail integrity or
    /// belong to another source.
    fn collect(
        &self,
        source: SourceAddress,
        entries: Vec<EventStreamEntry>,
        report: &mut SyncReport,
    ) -> EventStream {
        let mut stream = EventStream::new(source);
        for entry in entries {
            if self.config.verify_integrity && !entry.verify_integrity() {
                warn!(entry = %entry.id, source = %entry.source, "integrity check failed, dropping entry");
                report.rejected += 1;
                continue;
            }
            if let Err(e) = stream.append(entry) {
                warn!(error = %e, "dropping entry");
                report.rejected += 1;
            }
        }
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use roam_event::StorageUpdateEvent;
    use roam_store::InMemoryContentStore;
    use roam_stream::{InMemoryEventLog, Timestamp};
    use roam_tree::{FolderNodeData, MutableFolder, TreeConfig, TreeContext};

    use crate::publish::InMemoryHeadRegistry;
    use crate::transport::InMemoryTransport;

    struct Peer {
        log: Arc<InMemoryEventLog>,
        ctx: Arc<TreeContext>,
        root: Arc<NomadFolder>,
        engine: SyncEngine,
    }

    fn peer(
        name: &str,
        others: &[&str],
        transport: &Arc<InMemoryTransport>,
        heads: &Arc<InMemoryHeadRegistry>,
    ) -> Peer {
        let log = Arc::new(InMemoryEventLog::new(SourceAddress::from_key_name(name)));
        transport.serve(log.clone());
        let ctx = TreeContext::with_sources(
            TreeConfig::default(),
            log.clone(),
            Arc::new(InMemoryContentStore::new()),
            others.iter().map(|o| SourceAddress::from_key_name(o)).collect(),
        )
        .unwrap();
        let root = ctx.root();
        let engine = SyncEngine::new(SyncConfig::default(), transport.clone(), heads.clone()).unwrap();
        Peer {
            log,
            ctx,
            root,
            engine,
        }
    }

    fn pair() -> (Peer, Peer) {
        let transport = Arc::new(InMemoryTransport::new());
        let heads = Arc::new(InMemoryHeadRegistry::new());
        (
            peer("alice", &["bob"], &transport, &heads),
            peer("bob", &["alice"], &transport, &heads),
        )
    }

    /// Every node id with its content, ignoring child order and sources.
    fn layout(folder: &FolderNodeData) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for file in &folder.files {
            let content = file.content.map(|p| p.to_hex()).unwrap_or_default();
            out.insert(format!("{}={content}", file.id));
        }
        for sub in &folder.folders {
            out.insert(format!("{}/", sub.id));
            out.extend(layout(sub));
        }
        out
    }

    /// Every node id in child order.
    fn ordered(folder: &FolderNodeData) -> Vec<String> {
        let mut out = Vec::new();
        for file in &folder.files {
            out.push(file.id.clone());
        }
        for sub in &folder.folders {
            out.push(sub.id.clone());
            out.extend(ordered(sub));
        }
        out
    }

    #[tokio::test]
    async fn two_peers_converge() {
        let cancel = CancellationToken::new();
        let (alice, bob) = pair();

        let docs = alice.root.create_folder("docs", false, &cancel).await.unwrap();
        docs.create_file("a.txt", false, &cancel).await.unwrap();
        let docs = bob.root.create_folder("docs", false, &cancel).await.unwrap();
        let b = docs.create_file("b.txt", false, &cancel).await.unwrap();
        b.write_content(Bytes::from_static(b"from bob"), &cancel)
            .await
            .unwrap();

        let report = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(report.sources, 2);
        assert_eq!(report.failed, 0);
        bob.engine.pull(&bob.root, &cancel).await.unwrap();

        let expected: BTreeSet<String> = [
            "root/docs/".to_string(),
            "root/docs/a.txt=".to_string(),
            format!("root/docs/b.txt={}", b.content_pointer().unwrap().unwrap().to_hex()),
        ]
        .into_iter()
        .collect();
        assert_eq!(layout(&alice.ctx.snapshot()), expected);
        assert_eq!(layout(&bob.ctx.snapshot()), expected);
    }

    #[tokio::test]
    async fn repeated_pull_changes_nothing() {
        let cancel = CancellationToken::new();
        let (alice, bob) = pair();
        bob.root.create_file("f", false, &cancel).await.unwrap();

        let first = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(first.applied, 1);
        let before = alice.ctx.snapshot();

        let second = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(alice.ctx.snapshot(), before);
    }

    #[tokio::test]
    async fn resync_replays_in_the_same_order_on_both_peers() {
        let cancel = CancellationToken::new();
        let (alice, bob) = pair();
        alice.root.create_file("x", false, &cancel).await.unwrap();
        bob.root.create_file("y", false, &cancel).await.unwrap();
        alice.root.create_file("z", false, &cancel).await.unwrap();

        alice.engine.pull(&alice.root, &cancel).await.unwrap();
        bob.engine.pull(&bob.root, &cancel).await.unwrap();
        alice.engine.resync(&alice.root, &cancel).await.unwrap();
        bob.engine.resync(&bob.root, &cancel).await.unwrap();

        assert_eq!(ordered(&alice.ctx.snapshot()), ordered(&bob.ctx.snapshot()));
        assert_eq!(alice.root.data().unwrap().files.len(), 3);
    }

    #[tokio::test]
    async fn entries_ahead_of_their_target_are_retried() {
        let cancel = CancellationToken::new();
        let transport = Arc::new(InMemoryTransport::new());
        let heads = Arc::new(InMemoryHeadRegistry::new());
        let carol = peer("carol", &[], &transport, &heads);
        let bob = peer("bob", &["carol"], &transport, &heads);
        let alice = peer("alice", &["bob"], &transport, &heads);

        carol.root.create_folder("docs", false, &cancel).await.unwrap();
        bob.engine.pull(&bob.root, &cancel).await.unwrap();
        let docs = bob.root.get_item("root/docs").unwrap().into_folder().unwrap();
        docs.create_file("x", false, &cancel).await.unwrap();

        // Bob's file lands in a folder Alice has not heard of yet.
        let first = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(first.ignored, 1);
        assert_eq!(first.pending, 1);
        assert!(alice.root.data().unwrap().is_empty());

        alice.root.add_source(SourceAddress::from_key_name("carol")).unwrap();
        let second = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(second.applied, 2);
        assert_eq!(second.pending, 0);
        assert_eq!(layout(&alice.ctx.snapshot()), layout(&bob.ctx.snapshot()));

        let third = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(third.applied, 0);
        assert_eq!(third.pending, 0);
    }

    #[tokio::test]
    async fn pending_entries_are_bounded() {
        let cancel = CancellationToken::new();
        let transport = Arc::new(InMemoryTransport::new());
        let heads = Arc::new(InMemoryHeadRegistry::new());
        let carol = peer("carol", &[], &transport, &heads);
        let bob = peer("bob", &["carol"], &transport, &heads);
        let alice = peer("alice", &["bob"], &transport, &heads);
        let config = SyncConfig {
            max_pending: 1,
            ..SyncConfig::default()
        };
        let engine = SyncEngine::new(config, transport.clone(), heads.clone()).unwrap();

        carol.root.create_folder("docs", false, &cancel).await.unwrap();
        bob.engine.pull(&bob.root, &cancel).await.unwrap();
        let docs = bob.root.get_item("root/docs").unwrap().into_folder().unwrap();
        docs.create_file("a", false, &cancel).await.unwrap();
        docs.create_file("b", false, &cancel).await.unwrap();

        let report = engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(report.ignored, 2);
        assert_eq!(report.pending, 1);

        // Only the newest entry survived the limit.
        alice.root.add_source(SourceAddress::from_key_name("carol")).unwrap();
        engine.pull(&alice.root, &cancel).await.unwrap();
        let files: Vec<String> = alice.ctx.snapshot().folders[0]
            .files
            .iter()
            .map(|f| f.id.clone())
            .collect();
        assert_eq!(files, vec!["root/docs/b".to_string()]);
    }

    #[tokio::test]
    async fn unchanged_head_skips_fetch() {
        let cancel = CancellationToken::new();
        let (alice, bob) = pair();
        bob.root.create_file("f", false, &cancel).await.unwrap();
        let published = bob.engine.publish(bob.log.as_ref()).await.unwrap();
        assert!(published.is_some());

        let first = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(first.unchanged, 0);
        let second = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(second.unchanged, 1);

        bob.root.create_file("g", false, &cancel).await.unwrap();
        bob.engine.publish(bob.log.as_ref()).await.unwrap();
        let third = alice.engine.pull(&alice.root, &cancel).await.unwrap();
        assert_eq!(third.unchanged, 0);
        assert_eq!(third.fetched, 1);
        assert_eq!(alice.root.data().unwrap().files.len(), 2);
    }

    #[tokio::test]
    async fn publish_of_empty_log_is_none() {
        let (alice, _bob) = pair();
        assert_eq!(alice.engine.publish(alice.log.as_ref()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_pull_fails() {
        let (alice, _bob) = pair();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = alice.engine.pull(&alice.root, &cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    /// Serves one tampered entry for any source.
    struct TamperingTransport;

    #[async_trait]
    impl SourceTransport for TamperingTransport {
        async fn fetch_entries(
            &self,
            source: &SourceAddress,
            _since: Option<&EntryId>,
        ) -> SyncResult<Vec<EventStreamEntry>> {
            let mut entry = EventStreamEntry::for_event(
                StorageUpdateEvent::create_file("root", "root/evil", "evil", false),
                Timestamp::new(1, 0),
                source.clone(),
            );
            entry.target_id = "root/elsewhere".into();
            Ok(vec![entry])
        }
    }

    /// Never answers in time.
    struct StalledTransport;

    #[async_trait]
    impl SourceTransport for StalledTransport {
        async fn fetch_entries(
            &self,
            _source: &SourceAddress,
            _since: Option<&EntryId>,
        ) -> SyncResult<Vec<EventStreamEntry>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn engine_with(transport: Arc<dyn SourceTransport>, config: SyncConfig) -> SyncEngine {
        SyncEngine::new(config, transport, Arc::new(InMemoryHeadRegistry::new())).unwrap()
    }

    #[tokio::test]
    async fn tampered_entries_are_rejected() {
        let (alice, _bob) = pair();
        let engine = engine_with(Arc::new(TamperingTransport), SyncConfig::default());

        let report = engine
            .pull(&alice.root, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.rejected, 1);
        assert!(alice.root.data().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let (alice, _bob) = pair();
        let config = SyncConfig {
            fetch_timeout: Duration::from_millis(20),
            ..SyncConfig::default()
        };
        let engine = engine_with(Arc::new(StalledTransport), config);

        let result = engine.pull(&alice.root, &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::Timeout { after, .. }) if after == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn cancel_interrupts_a_stalled_fetch() {
        let (alice, _bob) = pair();
        let engine = engine_with(Arc::new(StalledTransport), SyncConfig::default());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let result = engine.pull(&alice.root, &cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
