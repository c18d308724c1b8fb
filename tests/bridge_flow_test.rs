//! 通知桥接端到端测试
//!
//! 使用内存历史、手动时钟和记录型宿主，验证：
//! - 重复 / 冷却 / 冷却过期 的完整时间线
//! - 自回声过滤
//! - 宿主分发失败不影响后续通知
//! - JSON 行事件循环

use async_trait::async_trait;
use pim_responder::ai::{ConversationTurn, Credential, CredentialPool, GenerationTransport, ReplyGenerator};
use pim_responder::error::TransportError;
use pim_responder::history::{HistoryProvider, MemoryHistory};
use pim_responder::host::{run_event_loop, JsonLinesHost};
use pim_responder::notification::{
    DropReason, HandleOutcome, InboundMessageGate, ManualClock, NotificationAction,
    NotificationBridge, NotificationHost, PlatformNotification, RemoteInput, ReplyTarget,
    INSTAGRAM_PACKAGE,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const T0: u64 = 1_700_000_000_000;

/// 依次返回 "reply 1"、"reply 2" ... 的传输层
#[derive(Default)]
struct CountingTransport {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

#[async_trait]
impl GenerationTransport for CountingTransport {
    async fn send(
        &self,
        _credential: &Credential,
        _conversation: &[ConversationTurn],
    ) -> Result<String, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(format!("reply {}", n))
    }
}

/// 记录指令，可配置为回复失败
#[derive(Default)]
struct RecordingHost {
    fail_replies: bool,
    replies: Mutex<Vec<(String, String)>>,
    dismissed: Mutex<Vec<String>>,
}

impl NotificationHost for RecordingHost {
    fn name(&self) -> &str {
        "recording"
    }

    fn send_reply(&self, key: &str, _target: &ReplyTarget, text: &str) -> anyhow::Result<()> {
        if self.fail_replies {
            anyhow::bail!("reply action was cancelled");
        }
        self.replies.lock().unwrap().push((key.to_string(), text.to_string()));
        Ok(())
    }

    fn dismiss(&self, key: &str) -> anyhow::Result<()> {
        self.dismissed.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

struct Harness {
    bridge: NotificationBridge,
    host: Arc<RecordingHost>,
    history: Arc<MemoryHistory>,
    clock: Arc<ManualClock>,
    transport: Arc<CountingTransport>,
}

fn harness(host: RecordingHost, transport: CountingTransport) -> Harness {
    let pool = Arc::new(CredentialPool::from_secrets(["k1", "k2"]).unwrap());
    let transport = Arc::new(transport);
    let generator = Arc::new(ReplyGenerator::new(pool, transport.clone()));
    let host = Arc::new(host);
    let history = Arc::new(MemoryHistory::new());
    let clock = Arc::new(ManualClock::new(T0));

    let bridge = NotificationBridge::new(
        Arc::new(InboundMessageGate::default()),
        generator,
        history.clone(),
        host.clone(),
    )
    .with_clock(clock.clone());

    Harness {
        bridge,
        host,
        history,
        clock,
        transport,
    }
}

fn dm(key: &str, sender: &str, text: &str) -> PlatformNotification {
    PlatformNotification {
        key: key.to_string(),
        package: INSTAGRAM_PACKAGE.to_string(),
        title: Some(sender.to_string()),
        text: Some(text.to_string()),
        group_summary: false,
        actions: vec![NotificationAction {
            title: "Reply".to_string(),
            inputs: vec![RemoteInput {
                result_key: "reply_text".to_string(),
                allow_free_form: true,
            }],
        }],
    }
}

#[tokio::test]
async fn test_duplicate_cooldown_and_expiry_timeline() {
    let h = harness(RecordingHost::default(), CountingTransport::default());

    // t0: 首条消息放行并回复
    assert_eq!(h.bridge.handle(&dm("n1", "bob", "hi")), HandleOutcome::Spawned);
    h.bridge.wait_idle().await;
    assert_eq!(h.bridge.gate().last_reply_at("bob"), Some(T0));

    // t0+1: 同一条消息重复
    h.clock.set(T0 + 1);
    assert_eq!(
        h.bridge.handle(&dm("n2", "bob", "hi")),
        HandleOutcome::Dropped(DropReason::Duplicate)
    );

    // t0+1: 新消息但仍在冷却中
    assert_eq!(
        h.bridge.handle(&dm("n3", "bob", "you there?")),
        HandleOutcome::Dropped(DropReason::Cooldown { remaining_ms: 9_999 })
    );

    // 其他发送者不受影响
    assert_eq!(h.bridge.handle(&dm("n4", "amy", "hi")), HandleOutcome::Spawned);
    h.bridge.wait_idle().await;

    // t0+10001: 冷却过期
    h.clock.set(T0 + 10_001);
    assert_eq!(
        h.bridge.handle(&dm("n5", "bob", "you there?")),
        HandleOutcome::Spawned
    );
    h.bridge.wait_idle().await;

    let replies = h.host.replies.lock().unwrap().clone();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0], ("n1".to_string(), "reply 1".to_string()));
    assert_eq!(
        *h.host.dismissed.lock().unwrap(),
        vec!["n1".to_string(), "n4".to_string(), "n5".to_string()]
    );
    assert_eq!(h.bridge.gate().last_reply_at("bob"), Some(T0 + 10_001));

    // 历史中按顺序记录了两轮
    let history = h.history.history("bob").unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0], ConversationTurn::inbound("hi"));
    assert_eq!(history[3].content, replies[2].1);
}

#[tokio::test]
async fn test_own_reply_echo_is_never_answered() {
    let h = harness(RecordingHost::default(), CountingTransport::default());

    h.bridge.handle(&dm("n1", "bob", "hi"));
    h.bridge.wait_idle().await;

    // 平台把我们的回复又作为通知推送回来，即使冷却已过也不回复
    h.clock.set(T0 + 60_000);
    assert_eq!(
        h.bridge.handle(&dm("n2", "bob", "  REPLY 1 ")),
        HandleOutcome::Dropped(DropReason::SelfEcho)
    );
    assert_eq!(h.transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dispatch_failure_still_dismisses_and_keeps_listening() {
    let host = RecordingHost {
        fail_replies: true,
        ..Default::default()
    };
    let h = harness(host, CountingTransport::default());

    assert_eq!(h.bridge.handle(&dm("n1", "bob", "hi")), HandleOutcome::Spawned);
    h.bridge.wait_idle().await;

    assert!(h.host.replies.lock().unwrap().is_empty());
    assert_eq!(*h.host.dismissed.lock().unwrap(), vec!["n1".to_string()]);
    // 冷却仍然生效
    assert_eq!(h.bridge.gate().last_reply_at("bob"), Some(T0));

    assert_eq!(h.bridge.handle(&dm("n2", "amy", "hey")), HandleOutcome::Spawned);
    h.bridge.wait_idle().await;
    assert_eq!(
        *h.host.dismissed.lock().unwrap(),
        vec!["n1".to_string(), "n2".to_string()]
    );
}

#[tokio::test]
async fn test_concurrent_senders_are_processed_in_parallel() {
    let transport = CountingTransport {
        delay: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let h = harness(RecordingHost::default(), transport);

    for i in 0..5 {
        let outcome = h.bridge.handle(&dm(&format!("n{}", i), &format!("user{}", i), "hi"));
        assert_eq!(outcome, HandleOutcome::Spawned);
    }
    // 处理是异步的，handle 不等待生成
    assert!(h.host.replies.lock().unwrap().is_empty());

    h.bridge.wait_idle().await;
    assert_eq!(h.host.replies.lock().unwrap().len(), 5);
    assert_eq!(h.bridge.in_flight(), 0);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_generation() {
    let transport = CountingTransport {
        delay: Some(Duration::from_secs(60)),
        ..Default::default()
    };
    let h = harness(RecordingHost::default(), transport);

    h.bridge.handle(&dm("n1", "bob", "hi"));
    tokio::time::timeout(Duration::from_secs(5), h.bridge.shutdown())
        .await
        .unwrap();

    assert!(h.host.replies.lock().unwrap().is_empty());
    assert_eq!(h.bridge.gate().last_reply_at("bob"), None);
}

// ============================================================================
// JSON 行事件循环
// ============================================================================

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_event_loop_reads_json_lines_and_emits_commands() {
    let pool = Arc::new(CredentialPool::from_secrets(["k1"]).unwrap());
    let generator = Arc::new(ReplyGenerator::new(
        pool,
        Arc::new(CountingTransport::default()),
    ));
    let out = SharedBuf::default();
    let bridge = NotificationBridge::new(
        Arc::new(InboundMessageGate::default()),
        generator,
        Arc::new(MemoryHistory::new()),
        Arc::new(JsonLinesHost::new(Box::new(out.clone()))),
    )
    .with_clock(Arc::new(ManualClock::new(T0)));

    let n1 = serde_json::to_string(&dm("n1", "bob", "hi")).unwrap();
    let mut other = dm("n2", "bob", "hi");
    other.package = "com.whatsapp".to_string();
    let other = serde_json::to_string(&other).unwrap();
    let input = format!("{}\nnot json\n\n{}\n{}\n", n1, other, n1);

    let stats = run_event_loop(&bridge, input.as_bytes()).await.unwrap();
    bridge.wait_idle().await;

    assert_eq!(stats.lines, 4);
    assert_eq!(stats.invalid, 1);
    assert_eq!(stats.spawned, 1);

    let output = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(
        lines,
        vec![
            r#"{"type":"reply","key":"n1","action":0,"result_key":"reply_text","text":"reply 1"}"#,
            r#"{"type":"dismiss","key":"n1"}"#,
        ]
    );
}

#[tokio::test]
async fn test_event_loop_skips_non_utf8_line_and_keeps_reading() {
    let pool = Arc::new(CredentialPool::from_secrets(["k1"]).unwrap());
    let generator = Arc::new(ReplyGenerator::new(
        pool,
        Arc::new(CountingTransport::default()),
    ));
    let out = SharedBuf::default();
    let bridge = NotificationBridge::new(
        Arc::new(InboundMessageGate::default()),
        generator,
        Arc::new(MemoryHistory::new()),
        Arc::new(JsonLinesHost::new(Box::new(out.clone()))),
    )
    .with_clock(Arc::new(ManualClock::new(T0)));

    let mut input: Vec<u8> = b"{\"key\":\"bad\xff\"}\n".to_vec();
    input.extend_from_slice(serde_json::to_string(&dm("n1", "bob", "hi")).unwrap().as_bytes());
    input.push(b'\n');

    let stats = run_event_loop(&bridge, input.as_slice()).await.unwrap();
    bridge.wait_idle().await;

    assert_eq!(stats.lines, 2);
    assert_eq!(stats.invalid, 1);
    assert_eq!(stats.spawned, 1);
    let output = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
    assert_eq!(output.lines().count(), 2);
}
