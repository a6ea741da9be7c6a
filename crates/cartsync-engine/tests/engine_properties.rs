//! Behavioral tests for the sync engine
//!
//! Drives a SyncEngine against an in-memory guest store and a scripted
//! fake shop API that can fail or hold individual calls.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify, Semaphore};

use cartsync::{
    AuthSignal, CartResponse, EngineError, EngineListener, EngineResult, EngineSnapshot,
    RemoteCartLine, RemoteConnector, RemoteStore, SyncEngine, WishlistResponse,
};
use cartsync_core::{Mode, Money, ProductRef, ProductSnapshot};
use cartsync_store::{
    FileStore, GuestCartLine, GuestStore, LocalStore, MemoryStore, StoreError, StoreResult,
    CART_KEY, WISHLIST_KEY,
};

const DEFAULT_PRICE: i64 = 1000;

// ============================================================================
// Fake Shop API
// ============================================================================

struct FakeRemote {
    cart: Mutex<Vec<(String, i64, i64)>>,
    wishlist: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    held: Mutex<HashSet<&'static str>>,
    entered: Notify,
    release: Semaphore,
    parking: Mutex<HashSet<&'static str>>,
    parked: Mutex<Vec<Option<oneshot::Sender<()>>>>,
    calls: Mutex<Vec<&'static str>>,
    active_fetches: AtomicUsize,
    max_fetches: AtomicUsize,
}

impl FakeRemote {
    fn new() -> Arc<Self> {
        Arc::new(FakeRemote {
            cart: Mutex::new(Vec::new()),
            wishlist: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            held: Mutex::new(HashSet::new()),
            entered: Notify::new(),
            release: Semaphore::new(0),
            parking: Mutex::new(HashSet::new()),
            parked: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            active_fetches: AtomicUsize::new(0),
            max_fetches: AtomicUsize::new(0),
        })
    }

    fn seed_cart(&self, id: &str, quantity: i64, price: i64) {
        self.cart
            .lock()
            .unwrap()
            .push((id.to_string(), quantity, price));
    }

    fn seed_wishlist(&self, id: &str) {
        self.wishlist.lock().unwrap().push(id.to_string());
    }

    fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    fn heal(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// The next call to `op` waits for `release_one`.
    fn hold(&self, op: &'static str) {
        self.held.lock().unwrap().insert(op);
    }

    fn release_one(&self) {
        self.release.add_permits(1);
    }

    /// Every call to `op` waits until `unpark` is called with its arrival
    /// index, so calls can be released in any order.
    fn park(&self, op: &'static str) {
        self.parking.lock().unwrap().insert(op);
    }

    async fn wait_parked(&self, count: usize) {
        for _ in 0..1000 {
            if self.parked.lock().unwrap().len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} parked calls", count);
    }

    fn unpark(&self, index: usize) {
        let sender = self.parked.lock().unwrap()[index].take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    fn calls_to(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    fn quantity_of(&self, id: &str) -> Option<i64> {
        self.cart
            .lock()
            .unwrap()
            .iter()
            .find(|(pid, _, _)| pid == id)
            .map(|(_, q, _)| *q)
    }

    async fn gate(&self, op: &'static str) -> EngineResult<()> {
        self.calls.lock().unwrap().push(op);

        let hold = self.held.lock().unwrap().remove(op);
        if hold {
            self.entered.notify_one();
            self.release.acquire().await.unwrap().forget();
        }

        let park = self.parking.lock().unwrap().contains(op);
        if park {
            let (sender, receiver) = oneshot::channel();
            self.parked.lock().unwrap().push(Some(sender));
            let _ = receiver.await;
        }

        if self.failing.lock().unwrap().contains(op) {
            return Err(EngineError::remote(op, "HTTP 503 Service Unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn fetch_cart(&self) -> EngineResult<CartResponse> {
        let now = self.active_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_fetches.fetch_max(now, Ordering::SeqCst);

        let gated = self.gate("fetch_cart").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active_fetches.fetch_sub(1, Ordering::SeqCst);
        gated?;

        let lines: Vec<RemoteCartLine> = self
            .cart
            .lock()
            .unwrap()
            .iter()
            .map(|(id, quantity, price)| RemoteCartLine {
                product: ProductRef::from(
                    ProductSnapshot::new(id.clone()).with_price(Money::from_cents(*price)),
                ),
                quantity: *quantity,
                item_total: Money::from_cents(price * quantity),
                price: None,
            })
            .collect();
        let total: Money = lines.iter().map(|l| l.item_total).sum();

        Ok(CartResponse {
            cart: lines,
            cart_total: Some(total),
        })
    }

    async fn fetch_wishlist(&self) -> EngineResult<WishlistResponse> {
        self.gate("fetch_wishlist").await?;
        Ok(WishlistResponse {
            wishlist: self
                .wishlist
                .lock()
                .unwrap()
                .iter()
                .map(|id| ProductRef::from(ProductSnapshot::new(id.clone()).with_name("Thing")))
                .collect(),
        })
    }

    async fn add_to_cart(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        self.gate("add_to_cart").await?;
        let mut cart = self.cart.lock().unwrap();
        match cart.iter_mut().find(|(id, _, _)| id == product_id) {
            Some(line) => line.1 += quantity,
            None => cart.push((product_id.to_string(), quantity, DEFAULT_PRICE)),
        }
        Ok(())
    }

    async fn update_cart_item(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        self.gate("update_cart_item").await?;
        let mut cart = self.cart.lock().unwrap();
        match cart.iter_mut().find(|(id, _, _)| id == product_id) {
            Some(line) => {
                line.1 = quantity;
                Ok(())
            }
            None => Err(EngineError::remote("update_cart_item", "HTTP 404 Not Found")),
        }
    }

    async fn remove_from_cart(&self, product_id: &str) -> EngineResult<()> {
        self.gate("remove_from_cart").await?;
        self.cart.lock().unwrap().retain(|(id, _, _)| id != product_id);
        Ok(())
    }

    async fn clear_cart(&self) -> EngineResult<()> {
        self.gate("clear_cart").await?;
        self.cart.lock().unwrap().clear();
        Ok(())
    }

    async fn add_to_wishlist(&self, product_id: &str) -> EngineResult<()> {
        self.gate("add_to_wishlist").await?;
        let mut wishlist = self.wishlist.lock().unwrap();
        if !wishlist.iter().any(|id| id == product_id) {
            wishlist.push(product_id.to_string());
        }
        Ok(())
    }

    async fn remove_from_wishlist(&self, product_id: &str) -> EngineResult<()> {
        self.gate("remove_from_wishlist").await?;
        self.wishlist.lock().unwrap().retain(|id| id != product_id);
        Ok(())
    }
}

struct FakeConnector {
    remote: Arc<FakeRemote>,
    tokens: Mutex<Vec<String>>,
}

impl RemoteConnector for FakeConnector {
    fn connect(&self, token: &str) -> EngineResult<Arc<dyn RemoteStore>> {
        self.tokens.lock().unwrap().push(token.to_string());
        Ok(self.remote.clone())
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct Recorder {
    snapshots: Mutex<Vec<EngineSnapshot>>,
    errors: Mutex<Vec<String>>,
}

impl EngineListener for Recorder {
    fn on_change(&self, snapshot: &EngineSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn on_error(&self, operation: &str, _error: &EngineError) {
        self.errors.lock().unwrap().push(operation.to_string());
    }
}

fn connector(remote: &Arc<FakeRemote>) -> Arc<FakeConnector> {
    Arc::new(FakeConnector {
        remote: remote.clone(),
        tokens: Mutex::new(Vec::new()),
    })
}

async fn guest_engine(guest: GuestStore, remote: &Arc<FakeRemote>) -> Arc<SyncEngine> {
    let engine = SyncEngine::new(guest, connector(remote), AuthSignal::Anonymous).unwrap();
    engine.refresh().await.unwrap();
    Arc::new(engine)
}

async fn signed_in_engine(remote: &Arc<FakeRemote>) -> Arc<SyncEngine> {
    let engine = SyncEngine::new(
        GuestStore::in_memory(),
        connector(remote),
        AuthSignal::authenticated("token-1"),
    )
    .unwrap();
    engine.refresh().await.unwrap();
    Arc::new(engine)
}

async fn wait_until(engine: &SyncEngine, predicate: impl Fn(&EngineSnapshot) -> bool) {
    for _ in 0..1000 {
        if predicate(&engine.snapshot()) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never held; last snapshot: {:?}", engine.snapshot());
}

// ============================================================================
// Aggregate Invariants
// ============================================================================

#[tokio::test]
async fn aggregates_match_items_in_every_published_snapshot() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 2, 450);

    let engine = guest_engine(GuestStore::in_memory(), &remote).await;
    let recorder = Arc::new(Recorder::default());
    engine.subscribe(recorder.clone());

    engine.add_item_priced("x", 2, Money::from_cents(300)).await.unwrap();
    engine.add_item("y").await.unwrap();
    engine.update_quantity("x", 5).await.unwrap();
    engine.remove_item("y").await.unwrap();

    engine.set_auth(AuthSignal::authenticated("t")).await.unwrap();
    engine.add_item_quantity("b", 3).await.unwrap();
    engine.update_quantity("a", 4).await.unwrap();

    let snapshots = recorder.snapshots.lock().unwrap();
    assert!(!snapshots.is_empty());
    for snapshot in snapshots.iter() {
        assert_eq!(snapshot.cart_count(), snapshot.cart.items().len());
        let sum: Money = snapshot.cart.items().iter().map(|i| i.item_total).sum();
        assert_eq!(snapshot.cart_total(), sum);
    }

    let last = engine.snapshot();
    assert_eq!(last.cart_total().cents(), 4 * 450 + 3 * DEFAULT_PRICE);
}

#[tokio::test]
async fn revisions_increase_monotonically() {
    let remote = FakeRemote::new();
    let engine = guest_engine(GuestStore::in_memory(), &remote).await;
    let recorder = Arc::new(Recorder::default());
    engine.subscribe(recorder.clone());

    engine.add_item("a").await.unwrap();
    engine.add_wishlist("a").await.unwrap();
    engine.clear_cart().await.unwrap();

    let revisions: Vec<u64> = recorder
        .snapshots
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.revision)
        .collect();
    assert!(revisions.windows(2).all(|w| w[0] < w[1]));
}

// ============================================================================
// Idempotence & Merge
// ============================================================================

#[tokio::test]
async fn clear_cart_twice_is_empty_both_times() {
    let remote = FakeRemote::new();

    let guest = guest_engine(GuestStore::in_memory(), &remote).await;
    guest.add_item("a").await.unwrap();
    guest.clear_cart().await.unwrap();
    assert!(guest.snapshot().cart.is_empty());
    guest.clear_cart().await.unwrap();
    assert!(guest.snapshot().cart.is_empty());

    remote.seed_cart("r", 1, 100);
    let signed_in = signed_in_engine(&remote).await;
    signed_in.clear_cart().await.unwrap();
    assert!(signed_in.snapshot().cart.is_empty());
    signed_in.clear_cart().await.unwrap();
    assert!(signed_in.snapshot().cart.is_empty());
}

#[tokio::test]
async fn guest_add_twice_merges_into_one_line() {
    let remote = FakeRemote::new();
    let engine = guest_engine(GuestStore::in_memory(), &remote).await;

    engine.add_item("a").await.unwrap();
    engine.add_item("a").await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart_count(), 1);
    assert_eq!(snapshot.cart.get("a").unwrap().quantity, 2);
    assert_eq!(remote.calls.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn authenticated_add_trusts_the_server_merge() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 1, 250);
    let engine = signed_in_engine(&remote).await;

    engine.add_item("a").await.unwrap();

    assert_eq!(remote.quantity_of("a"), Some(2));
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart.get("a").unwrap().quantity, 2);
    assert_eq!(snapshot.cart_total().cents(), 500);
    // One reload for refresh, one after the add.
    assert_eq!(remote.calls_to("fetch_cart"), 2);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn failed_remote_add_leaves_published_cart_unchanged() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 1, 100);
    let engine = signed_in_engine(&remote).await;
    let recorder = Arc::new(Recorder::default());
    engine.subscribe(recorder.clone());
    let before = engine.snapshot();

    remote.fail("add_to_cart");
    let err = engine.add_item("b").await.unwrap_err();

    assert!(err.is_remote_failure());
    let after = engine.snapshot();
    assert_eq!(after.cart, before.cart);
    assert!(!after.loading);
    assert_eq!(*recorder.errors.lock().unwrap(), vec!["add_item".to_string()]);
}

#[tokio::test]
async fn failed_wishlist_add_leaves_wishlist_unchanged() {
    let remote = FakeRemote::new();
    remote.seed_wishlist("w1");
    let engine = signed_in_engine(&remote).await;

    remote.fail("add_to_wishlist");
    let err = engine.add_wishlist("w2").await.unwrap_err();

    assert!(err.is_remote_failure());
    assert_eq!(engine.snapshot().wishlist_count(), 1);
    assert!(!engine.is_wishlisted("w2"));
}

#[tokio::test]
async fn failed_refresh_keeps_last_reconciled_state() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 2, 100);
    let engine = signed_in_engine(&remote).await;

    remote.fail("fetch_cart");
    assert!(engine.refresh_cart().await.unwrap_err().is_remote_failure());

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart.get("a").unwrap().quantity, 2);
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn local_write_failure_surfaces_as_storage_error() {
    #[derive(Debug)]
    struct ReadOnlyStore;

    impl LocalStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Ok(None)
        }

        fn set(&self, key: &str, _value: &str) -> StoreResult<()> {
            Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }

        fn remove(&self, _key: &str) -> StoreResult<()> {
            Ok(())
        }
    }

    let remote = FakeRemote::new();
    let engine = guest_engine(GuestStore::new(Arc::new(ReadOnlyStore)), &remote).await;

    let err = engine.add_item("a").await.unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)));
    assert!(engine.snapshot().cart.is_empty());
    assert!(!engine.snapshot().loading);
}

// ============================================================================
// Wishlist Representations
// ============================================================================

#[tokio::test]
async fn is_wishlisted_matches_either_representation() {
    let remote = FakeRemote::new();
    remote.seed_wishlist("embedded-1");

    let engine = guest_engine(GuestStore::in_memory(), &remote).await;
    engine.add_wishlist("bare-1").await.unwrap();
    engine.add_wishlist("bare-1").await.unwrap();
    assert!(engine.is_wishlisted("bare-1"));
    assert_eq!(engine.snapshot().wishlist_count(), 1);
    assert!(matches!(engine.snapshot().wishlist[0], ProductRef::Id(_)));

    engine.set_auth(AuthSignal::authenticated("t")).await.unwrap();
    assert!(engine.is_wishlisted("embedded-1"));
    assert!(!engine.is_wishlisted("bare-1"));
    assert!(matches!(
        engine.snapshot().wishlist[0],
        ProductRef::Embedded(_)
    ));

    engine.remove_wishlist("embedded-1").await.unwrap();
    assert!(!engine.is_wishlisted("embedded-1"));
}

// ============================================================================
// Mode Transitions
// ============================================================================

#[tokio::test]
async fn sign_in_replaces_guest_cart_without_merging() {
    let remote = FakeRemote::new();
    remote.seed_cart("remote-a", 1, 700);

    let guest_store = GuestStore::in_memory();
    let engine = guest_engine(guest_store.clone(), &remote).await;
    engine.add_item("guest-a").await.unwrap();
    engine.add_wishlist("guest-w").await.unwrap();

    engine
        .set_auth(AuthSignal::authenticated("token-xyz"))
        .await
        .unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.mode, Mode::Authenticated);
    assert!(snapshot.cart.contains("remote-a"));
    assert!(!snapshot.cart.contains("guest-a"));
    assert!(!engine.is_wishlisted("guest-w"));

    // Nothing was pushed to the server, and the guest slots are intact.
    assert_eq!(remote.calls_to("add_to_cart"), 0);
    assert_eq!(guest_store.read_cart(), vec![GuestCartLine::new("guest-a", 1)]);

    engine.set_auth(AuthSignal::Anonymous).await.unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.mode, Mode::Guest);
    assert!(snapshot.cart.contains("guest-a"));
    assert!(!snapshot.cart.contains("remote-a"));
    assert!(engine.is_wishlisted("guest-w"));
}

#[tokio::test]
async fn sign_in_hands_token_to_connector() {
    let remote = FakeRemote::new();
    let connector = connector(&remote);
    let engine =
        SyncEngine::new(GuestStore::in_memory(), connector.clone(), AuthSignal::Anonymous).unwrap();

    engine
        .set_auth(AuthSignal::authenticated("bearer-123"))
        .await
        .unwrap();

    assert_eq!(*connector.tokens.lock().unwrap(), vec!["bearer-123".to_string()]);
    assert_eq!(engine.mode(), Mode::Authenticated);
}

#[tokio::test]
async fn sign_out_with_corrupt_guest_storage_reads_empty() {
    let remote = FakeRemote::new();
    remote.seed_cart("r", 1, 100);

    let raw = Arc::new(MemoryStore::new());
    raw.set(CART_KEY, "{{{ definitely not json").unwrap();
    raw.set(WISHLIST_KEY, "42").unwrap();

    let engine = SyncEngine::new(
        GuestStore::new(raw.clone()),
        connector(&remote),
        AuthSignal::authenticated("t"),
    )
    .unwrap();
    engine.refresh().await.unwrap();
    assert!(engine.snapshot().cart.contains("r"));

    engine.set_auth(AuthSignal::Anonymous).await.unwrap();
    let snapshot = engine.snapshot();
    assert!(snapshot.cart.is_empty());
    assert!(snapshot.wishlist.is_empty());

    // The guest cart is usable again after recovery.
    engine.add_item("fresh").await.unwrap();
    assert!(engine.snapshot().cart.contains("fresh"));
}

// ============================================================================
// Quantity Rules
// ============================================================================

#[tokio::test]
async fn update_quantity_below_one_is_a_no_op() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 2, 100);
    let engine = signed_in_engine(&remote).await;
    let before = engine.snapshot();

    engine.update_quantity("a", 0).await.unwrap();
    engine.update_quantity("a", -1).await.unwrap();

    assert_eq!(engine.snapshot(), before);
    assert_eq!(remote.calls_to("update_cart_item"), 0);
    assert_eq!(remote.quantity_of("a"), Some(2));
}

#[tokio::test]
async fn update_quantity_for_missing_item_is_a_no_op() {
    let remote = FakeRemote::new();
    let engine = signed_in_engine(&remote).await;

    engine.update_quantity("ghost", 3).await.unwrap();

    assert_eq!(remote.calls_to("update_cart_item"), 0);
    assert!(engine.snapshot().cart.is_empty());

    let guest = guest_engine(GuestStore::in_memory(), &remote).await;
    guest.update_quantity("ghost", 3).await.unwrap();
    assert!(guest.snapshot().cart.is_empty());
}

// ============================================================================
// Optimistic Updates
// ============================================================================

#[tokio::test]
async fn optimistic_update_is_visible_then_confirmed() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 1, 500);
    let engine = signed_in_engine(&remote).await;

    remote.hold("update_cart_item");
    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.update_quantity("a", 3).await }
    });

    remote.entered.notified().await;
    let tentative = engine.snapshot();
    assert_eq!(tentative.cart.get("a").unwrap().quantity, 3);
    assert_eq!(tentative.cart_total().cents(), 1500);
    assert!(tentative.loading);

    remote.release_one();
    task.await.unwrap().unwrap();

    let settled = engine.snapshot();
    assert_eq!(settled.cart.get("a").unwrap().quantity, 3);
    assert_eq!(remote.quantity_of("a"), Some(3));
    assert!(!settled.loading);
}

#[tokio::test]
async fn optimistic_update_is_discarded_on_failure() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 1, 500);
    let engine = signed_in_engine(&remote).await;

    remote.hold("update_cart_item");
    remote.fail("update_cart_item");
    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.update_quantity("a", 4).await }
    });

    remote.entered.notified().await;
    assert_eq!(engine.snapshot().cart.get("a").unwrap().quantity, 4);

    remote.release_one();
    let err = task.await.unwrap().unwrap_err();
    assert!(err.is_remote_failure());

    let settled = engine.snapshot();
    assert_eq!(settled.cart.get("a").unwrap().quantity, 1);
    assert_eq!(settled.cart_total().cents(), 500);
    assert!(!settled.loading);
}

#[tokio::test]
async fn failed_update_and_failed_reload_restore_last_confirmed_cart() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 2, 100);
    let engine = signed_in_engine(&remote).await;

    remote.fail("update_cart_item");
    remote.fail("fetch_cart");
    let err = engine.update_quantity("a", 9).await.unwrap_err();
    assert!(err.is_remote_failure());

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart.get("a").unwrap().quantity, 2);
    assert_eq!(snapshot.cart_total().cents(), 200);
    assert!(!snapshot.loading);

    remote.heal("fetch_cart");
    remote.heal("update_cart_item");
    engine.update_quantity("a", 9).await.unwrap();
    assert_eq!(engine.snapshot().cart.get("a").unwrap().quantity, 9);
}

#[tokio::test]
async fn guest_update_recomputes_total_from_unit_price() {
    let remote = FakeRemote::new();
    let engine = guest_engine(GuestStore::in_memory(), &remote).await;

    engine
        .add_item_priced("a", 1, Money::from_cents(1250))
        .await
        .unwrap();
    engine.update_quantity("a", 4).await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart.get("a").unwrap().item_total.cents(), 5000);
    assert_eq!(snapshot.cart_total().cents(), 5000);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn results_from_swapped_out_backend_are_dropped() {
    let remote = FakeRemote::new();
    remote.seed_cart("remote-item", 1, 100);

    let guest_store = GuestStore::in_memory();
    guest_store
        .write_cart(&[GuestCartLine::new("guest-item", 1)])
        .unwrap();

    let engine = Arc::new(
        SyncEngine::new(
            guest_store,
            connector(&remote),
            AuthSignal::authenticated("t"),
        )
        .unwrap(),
    );
    let recorder = Arc::new(Recorder::default());
    engine.subscribe(recorder.clone());

    remote.hold("fetch_cart");
    let stale_reload = tokio::spawn({
        let engine = engine.clone();
        async move { engine.refresh_cart().await }
    });
    remote.entered.notified().await;

    let sign_out = tokio::spawn({
        let engine = engine.clone();
        async move { engine.set_auth(AuthSignal::Anonymous).await }
    });
    wait_until(&engine, |s| s.mode == Mode::Guest).await;

    remote.release_one();
    stale_reload.await.unwrap().unwrap();
    sign_out.await.unwrap().unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.mode, Mode::Guest);
    assert!(snapshot.cart.contains("guest-item"));
    assert!(!snapshot.cart.contains("remote-item"));

    let leaked = recorder
        .snapshots
        .lock()
        .unwrap()
        .iter()
        .any(|s| s.mode == Mode::Guest && s.cart.contains("remote-item"));
    assert!(!leaked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cart_reloads_never_overlap() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 1, 100);
    let engine = signed_in_engine(&remote).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                engine.refresh_cart().await
            } else {
                engine.add_item(&format!("p{}", i)).await
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(remote.max_fetches.load(Ordering::SeqCst), 1);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart_count(), 5);
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn last_completed_reload_determines_published_cart() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 1, 500);
    let engine = signed_in_engine(&remote).await;
    let recorder = Arc::new(Recorder::default());
    engine.subscribe(recorder.clone());

    remote.park("update_cart_item");
    let earlier = tokio::spawn({
        let engine = engine.clone();
        async move { engine.update_quantity("a", 3).await }
    });
    remote.wait_parked(1).await;
    let later = tokio::spawn({
        let engine = engine.clone();
        async move { engine.update_quantity("a", 5).await }
    });
    remote.wait_parked(2).await;
    assert_eq!(engine.snapshot().cart.get("a").unwrap().quantity, 5);

    // The later update finishes first; the earlier one reloads last.
    remote.unpark(1);
    later.await.unwrap().unwrap();
    assert_eq!(engine.snapshot().cart.get("a").unwrap().quantity, 5);

    remote.unpark(0);
    earlier.await.unwrap().unwrap();

    assert_eq!(remote.quantity_of("a"), Some(3));
    let settled = engine.snapshot();
    assert_eq!(settled.cart.get("a").unwrap().quantity, 3);
    assert_eq!(settled.cart_total().cents(), 1500);
    assert!(!settled.loading);

    // Every publish is either a tentative patch or a server cart.
    let snapshots = recorder.snapshots.lock().unwrap();
    let mut quantities: Vec<i64> = Vec::new();
    for snapshot in snapshots.iter() {
        let line = snapshot.cart.get("a").unwrap();
        assert!([1, 3, 5].contains(&line.quantity));
        assert_eq!(snapshot.cart_total().cents(), line.quantity * 500);
        if quantities.last() != Some(&line.quantity) {
            quantities.push(line.quantity);
        }
    }
    assert_eq!(quantities, vec![1, 3, 5, 3]);
}

#[tokio::test]
async fn update_is_not_sent_to_swapped_out_backend() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 1, 100);

    let guest_store = GuestStore::in_memory();
    guest_store
        .write_cart(&[GuestCartLine::new("a", 1)])
        .unwrap();

    let engine = Arc::new(
        SyncEngine::new(
            guest_store.clone(),
            connector(&remote),
            AuthSignal::authenticated("t"),
        )
        .unwrap(),
    );

    // The update has to load the cart first; sign out while that is pending.
    remote.hold("fetch_cart");
    let update = tokio::spawn({
        let engine = engine.clone();
        async move { engine.update_quantity("a", 7).await }
    });
    remote.entered.notified().await;

    let sign_out = tokio::spawn({
        let engine = engine.clone();
        async move { engine.set_auth(AuthSignal::Anonymous).await }
    });
    wait_until(&engine, |s| s.mode == Mode::Guest).await;

    remote.release_one();
    update.await.unwrap().unwrap();
    sign_out.await.unwrap().unwrap();

    assert_eq!(remote.calls_to("update_cart_item"), 0);
    assert_eq!(remote.quantity_of("a"), Some(1));
    assert_eq!(guest_store.read_cart(), vec![GuestCartLine::new("a", 1)]);
    assert_eq!(engine.snapshot().cart.get("a").unwrap().quantity, 1);
}

#[tokio::test]
async fn loading_is_true_only_while_a_call_is_in_flight() {
    let remote = FakeRemote::new();
    let engine = signed_in_engine(&remote).await;
    assert!(!engine.snapshot().loading);

    remote.hold("add_to_cart");
    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.add_item("a").await }
    });

    remote.entered.notified().await;
    assert!(engine.snapshot().loading);

    remote.release_one();
    task.await.unwrap().unwrap();
    assert!(!engine.snapshot().loading);
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn unsubscribed_listeners_stop_receiving() {
    let remote = FakeRemote::new();
    let engine = guest_engine(GuestStore::in_memory(), &remote).await;
    let recorder = Arc::new(Recorder::default());

    let id = engine.subscribe(recorder.clone());
    engine.add_item("a").await.unwrap();
    let seen = recorder.snapshots.lock().unwrap().len();
    assert!(seen > 0);

    assert!(engine.unsubscribe(id));
    engine.add_item("b").await.unwrap();
    assert_eq!(recorder.snapshots.lock().unwrap().len(), seen);
}

#[tokio::test]
async fn watch_receiver_sees_latest_snapshot() {
    let remote = FakeRemote::new();
    let engine = guest_engine(GuestStore::in_memory(), &remote).await;
    let mut rx = engine.watch();

    engine.add_item("a").await.unwrap();

    assert!(rx.has_changed().unwrap());
    let latest = rx.borrow_and_update().clone();
    assert!(latest.cart.contains("a"));
    assert_eq!(latest, engine.snapshot());
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn new_guest_engine_starts_from_saved_slots() {
    let guest_store = GuestStore::in_memory();
    guest_store
        .write_cart(&[GuestCartLine::new("a", 1)])
        .unwrap();
    guest_store.write_wishlist(&["w".to_string()]).unwrap();

    let remote = FakeRemote::new();
    let engine =
        SyncEngine::new(guest_store.clone(), connector(&remote), AuthSignal::Anonymous).unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart_count(), 1);
    assert!(engine.is_wishlisted("w"));

    engine.update_quantity("a", 5).await.unwrap();

    assert_eq!(engine.snapshot().cart.get("a").unwrap().quantity, 5);
    assert_eq!(guest_store.read_cart(), vec![GuestCartLine::new("a", 5)]);
}

#[tokio::test]
async fn signed_in_update_loads_cart_before_checking_for_item() {
    let remote = FakeRemote::new();
    remote.seed_cart("a", 1, 200);

    let engine = SyncEngine::new(
        GuestStore::in_memory(),
        connector(&remote),
        AuthSignal::authenticated("t"),
    )
    .unwrap();
    assert!(engine.snapshot().cart.is_empty());

    engine.update_quantity("a", 4).await.unwrap();

    assert_eq!(remote.quantity_of("a"), Some(4));
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart.get("a").unwrap().quantity, 4);
    assert_eq!(snapshot.cart_total().cents(), 800);
}

#[tokio::test]
async fn guest_cart_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();

    {
        let store = GuestStore::new(Arc::new(FileStore::new(dir.path())));
        let engine = guest_engine(store, &remote).await;
        engine
            .add_item_priced("a", 2, Money::from_cents(199))
            .await
            .unwrap();
        engine.add_wishlist("w").await.unwrap();
    }

    let store = GuestStore::new(Arc::new(FileStore::new(dir.path())));
    let engine = guest_engine(store, &remote).await;
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.cart.get("a").unwrap().quantity, 2);
    assert_eq!(snapshot.cart_total().cents(), 398);
    assert!(engine.is_wishlisted("w"));
}
