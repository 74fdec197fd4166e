// tests/context_data_tests.rs
use stepflow::ContextData;

#[derive(Clone, Debug, Default, PartialEq)]
struct Tally {
  hits: u32,
  label: String,
}

#[test]
fn test_clones_share_state() {
  let ctx = ContextData::new(Tally::default());
  let other = ctx.clone();

  other.update(|t| t.hits += 2);
  ctx.write().label = "shared".to_string();

  assert_eq!(ctx.with(|t| t.hits), 2);
  assert_eq!(other.read().label, "shared");
}

#[test]
fn test_snapshot_is_detached() {
  let ctx = ContextData::new(Tally { hits: 1, label: "a".into() });
  let snap = ctx.snapshot();
  ctx.update(|t| t.hits = 10);

  assert_eq!(snap.hits, 1);
  assert_eq!(ctx.snapshot().hits, 10);
}

#[tokio::test]
async fn test_concurrent_updates_are_serialized() {
  let ctx = ContextData::new(Tally::default());
  let mut handles = Vec::new();
  for _ in 0..16 {
    let c = ctx.clone();
    handles.push(tokio::spawn(async move {
      for _ in 0..100 {
        c.update(|t| t.hits += 1);
        tokio::task::yield_now().await;
      }
    }));
  }
  for h in handles {
    h.await.unwrap();
  }
  assert_eq!(ctx.read().hits, 1600);
}
