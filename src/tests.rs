use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::actor::blocking::{BlockingActor, BlockingContext, BlockingOutcome};
use crate::actor::reactive::{ReactContext, ReactOutcome, ReactiveActor};
use crate::actor::{ActorError, KillSwitch, Mailbox, Observation};
use crate::channels::{ChannelError, Dfq, Dfs, Dfv};
use crate::operator::{InputChannel, Operator, OperatorBody, OperatorContext, OperatorOptions};
use crate::pool::Pool;

#[derive(Default, Debug)]
struct CollectorActor {
    seen: Vec<i32>,
}

#[async_trait]
impl ReactiveActor for CollectorActor {
    type Message = i32;
    type ObservableState = Vec<i32>;

    fn observable_state(&self) -> Vec<i32> {
        self.seen.clone()
    }

    async fn react(
        &mut self,
        message: i32,
        _ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome> {
        self.seen.push(message);
        Ok(ReactOutcome::Continue)
    }
}

#[tokio::test]
async fn messages_from_one_sender_are_processed_in_order() {
    let kill_switch = KillSwitch::default();
    let (mailbox, handle) =
        CollectorActor::default().spawn(Pool::current(), None, kill_switch.clone());
    for i in 1..=5 {
        mailbox.send_anonymous(i).await.unwrap();
    }
    for _ in 0..20 {
        if let Observation::Running(seen) = handle.observe().await {
            if seen.len() == 5 {
                assert_eq!(seen, vec![1, 2, 3, 4, 5]);
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("actor never observed all five messages");
}

#[derive(Default, Debug)]
struct TimeoutActor {
    timeout_fired: bool,
    drained_len_at_stop: Option<usize>,
}

#[async_trait]
impl ReactiveActor for TimeoutActor {
    type Message = ();
    type ObservableState = (bool, Option<usize>);

    fn observable_state(&self) -> (bool, Option<usize>) {
        (self.timeout_fired, self.drained_len_at_stop)
    }

    async fn after_start(&mut self, _ctx: &mut ReactContext<Self>) -> ReactOutcome {
        ReactOutcome::ContinueWithTimeout(Duration::from_millis(80))
    }

    async fn react(
        &mut self,
        _message: (),
        _ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome> {
        Ok(ReactOutcome::Continue)
    }

    async fn on_timeout(
        &mut self,
        _ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome> {
        self.timeout_fired = true;
        Ok(ReactOutcome::Stop)
    }

    async fn after_stop(&mut self, drained: Vec<()>, _ctx: &mut ReactContext<Self>) {
        self.drained_len_at_stop = Some(drained.len());
    }
}

#[tokio::test]
async fn react_timeout_fires_once_with_empty_drain() {
    let kill_switch = KillSwitch::default();
    let (_mailbox, handle) =
        TimeoutActor::default().spawn(Pool::current(), None, kill_switch);
    tokio::time::sleep(Duration::from_millis(250)).await;
    match handle.observe().await {
        Observation::Terminated((fired, drained)) => {
            assert!(fired);
            assert_eq!(drained, Some(0));
        }
        other => panic!("expected the actor to have stopped, got {:?}", other),
    }
}

#[derive(Debug, Clone)]
enum PingMessage {
    Start,
    Pong,
}

struct PingActor {
    pong: Mailbox<String>,
    got_pong: bool,
}

#[async_trait]
impl ReactiveActor for PingActor {
    type Message = PingMessage;
    type ObservableState = bool;

    fn observable_state(&self) -> bool {
        self.got_pong
    }

    async fn after_start(&mut self, ctx: &mut ReactContext<Self>) -> ReactOutcome {
        let _ = ctx.mailbox().send_anonymous(PingMessage::Start).await;
        ReactOutcome::Continue
    }

    async fn react(
        &mut self,
        message: PingMessage,
        _ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome> {
        match message {
            PingMessage::Start => {
                // Sent from within this chunk, so the current-sender task-local
                // captures this actor's own mailbox automatically.
                self.pong.send("ping".to_string()).await?;
                Ok(ReactOutcome::Continue)
            }
            PingMessage::Pong => {
                self.got_pong = true;
                Ok(ReactOutcome::Stop)
            }
        }
    }
}

struct PongActor;

#[async_trait]
impl ReactiveActor for PongActor {
    type Message = String;
    type ObservableState = usize;

    fn observable_state(&self) -> usize {
        0
    }

    async fn react(
        &mut self,
        message: String,
        ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome> {
        if message == "ping" {
            ctx.reply(PingMessage::Pong)?;
        }
        Ok(ReactOutcome::Continue)
    }
}

#[tokio::test]
async fn ping_pong_actors_exchange_a_reply() {
    let kill_switch = KillSwitch::default();
    let (pong_mailbox, pong_handle) = PongActor.spawn(Pool::current(), None, kill_switch.clone());
    let (_ping_mailbox, ping_handle) = PingActor {
        pong: pong_mailbox,
        got_pong: false,
    }
    .spawn(Pool::current(), None, kill_switch.clone());

    for _ in 0..50 {
        if let Observation::Running(true) | Observation::Terminated(true) =
            ping_handle.observe().await
        {
            pong_handle.stop();
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("ping actor never observed a pong reply");
}

#[derive(Default)]
struct ReplyProbeActor {
    last_reply_error: Option<String>,
}

#[async_trait]
impl ReactiveActor for ReplyProbeActor {
    type Message = ();
    type ObservableState = Option<String>;

    fn observable_state(&self) -> Option<String> {
        self.last_reply_error.clone()
    }

    async fn react(
        &mut self,
        _message: (),
        ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome> {
        self.last_reply_error = ctx.reply(()).err().map(|err| err.to_string());
        Ok(ReactOutcome::Continue)
    }
}

#[tokio::test]
async fn reply_with_no_current_sender_is_rejected() {
    let kill_switch = KillSwitch::default();
    let (mailbox, handle) =
        ReplyProbeActor::default().spawn(Pool::current(), None, kill_switch.clone());
    // send_anonymous leaves no current-sender task-local bound for the chunk.
    mailbox.send_anonymous(()).await.unwrap();
    for _ in 0..20 {
        if let Observation::Running(Some(err)) = handle.observe().await {
            assert_eq!(err, ActorError::NoCurrentSender.to_string());
            handle.stop();
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("actor never observed a reply failure");
}

#[tokio::test]
async fn dfv_rejects_second_bind() {
    let v = Dfv::<i32>::new();
    assert!(v.bind(1).is_ok());
    assert_eq!(v.bind(2), Err(ChannelError::AlreadyBound));
    assert_eq!(v.get_val().await, 1);
}

#[tokio::test]
async fn dfv_bind_unique_accepts_equal_rebind() {
    let v = Dfv::<i32>::new();
    v.bind(7).unwrap();
    assert!(v.bind_unique(7).is_ok());
    assert_eq!(v.bind_unique(8), Err(ChannelError::UniqueBindMismatch));
}

#[tokio::test]
async fn dfq_getval_times_out_and_frees_its_slot() {
    let q = Arc::new(Dfq::<i32>::new());
    let timed_out = q.get_val_timeout(Duration::from_millis(50)).await;
    assert_eq!(timed_out, Err(ChannelError::Timeout));
    q.left_shift(42);
    assert_eq!(q.get_val().await, 42);
}

#[tokio::test]
async fn dfs_reduce_sums_elements_until_close() {
    let head = Dfs::<i32>::new();
    let mut tail = head.clone();
    for value in [1, 2, 3, 4] {
        tail = tail.left_shift(value).unwrap();
    }
    tail.close().unwrap();
    let sum = head.reduce(0, |acc, value| acc + value).await;
    assert_eq!(sum, 10);
}

struct SumBody;

#[async_trait]
impl OperatorBody<i64> for SumBody {
    async fn apply(&self, inputs: Vec<i64>, ctx: &OperatorContext<i64>) -> anyhow::Result<()> {
        let sum: i64 = inputs.iter().sum();
        ctx.bind_output(0, sum);
        Ok(())
    }

    fn arity(&self) -> usize {
        3
    }
}

#[tokio::test]
async fn sum_operator_adds_three_dfv_inputs() {
    let a = Arc::new(Dfv::<i64>::new());
    let b = Arc::new(Dfv::<i64>::new());
    let c = Arc::new(Dfv::<i64>::new());
    let output = Arc::new(Dfq::<i64>::new());

    let options = OperatorOptions::builder()
        .input(InputChannel::dfv(a.clone()))
        .input(InputChannel::dfv(b.clone()))
        .input(InputChannel::dfv(c.clone()))
        .output(output.clone())
        .build()
        .unwrap();
    let operator = Operator::start(options, SumBody, Pool::current()).unwrap();

    a.bind(5).unwrap();
    b.bind(20).unwrap();
    c.bind(40).unwrap();

    let sum = output
        .get_val_timeout(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(sum, 65);

    operator.stop();
    operator.join().await;
}

struct AddBody;

#[async_trait]
impl OperatorBody<i64> for AddBody {
    async fn apply(&self, inputs: Vec<i64>, ctx: &OperatorContext<i64>) -> anyhow::Result<()> {
        ctx.bind_output(0, inputs[0] + inputs[1]);
        Ok(())
    }

    fn arity(&self) -> usize {
        2
    }
}

#[tokio::test]
async fn operator_reads_the_same_dfq_twice_per_round_in_fifo_order() {
    let q = Arc::new(Dfq::<i64>::new());
    let output = Arc::new(Dfq::<i64>::new());

    let options = OperatorOptions::builder()
        .input(InputChannel::dfq(q.clone()))
        .input(InputChannel::dfq(q.clone()))
        .output(output.clone())
        .build()
        .unwrap();
    let operator = Operator::start(options, AddBody, Pool::current()).unwrap();

    q.left_shift(1);
    q.left_shift(2);
    q.left_shift(3);
    q.left_shift(4);

    let first = output
        .get_val_timeout(Duration::from_secs(2))
        .await
        .unwrap();
    let second = output
        .get_val_timeout(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(first, 3);
    assert_eq!(second, 7);

    operator.stop();
    operator.join().await;
}

struct AtomicFanoutBody;

#[async_trait]
impl OperatorBody<i64> for AtomicFanoutBody {
    async fn apply(&self, inputs: Vec<i64>, ctx: &OperatorContext<i64>) -> anyhow::Result<()> {
        ctx.bind_all_outputs_atomically(inputs[0]).await;
        Ok(())
    }

    fn arity(&self) -> usize {
        1
    }
}

#[tokio::test]
async fn atomic_emit_preserves_cross_output_correlation_under_parallelism() {
    let input = Arc::new(Dfq::<i64>::new());
    let b = Arc::new(Dfq::<i64>::new());
    let c = Arc::new(Dfq::<i64>::new());
    let d = Arc::new(Dfq::<i64>::new());

    let options = OperatorOptions::builder()
        .input(InputChannel::dfq(input.clone()))
        .output(b.clone())
        .output(c.clone())
        .output(d.clone())
        .max_forks(5)
        .build()
        .unwrap();
    let operator = Operator::start(options, AtomicFanoutBody, Pool::current()).unwrap();

    for i in 1..=10 {
        input.left_shift(i);
    }

    let mut triples = Vec::new();
    for _ in 0..10 {
        let bv = b.get_val_timeout(Duration::from_secs(2)).await.unwrap();
        let cv = c.get_val_timeout(Duration::from_secs(2)).await.unwrap();
        let dv = d.get_val_timeout(Duration::from_secs(2)).await.unwrap();
        triples.push((bv, cv, dv));
    }

    operator.stop();
    operator.join().await;

    for (bv, cv, dv) in triples {
        assert_eq!(bv, cv);
        assert_eq!(cv, dv);
    }
}

#[tokio::test]
async fn operator_construction_rejects_zero_inputs() {
    let err = OperatorOptions::<i64>::builder().build().unwrap_err();
    assert_eq!(
        err.to_string(),
        "operator requires at least one input"
    );
}

#[tokio::test]
async fn operator_construction_rejects_zero_forks() {
    let a = Arc::new(Dfv::<i64>::new());
    let err = OperatorOptions::builder()
        .input(InputChannel::dfv(a))
        .max_forks(0)
        .build()
        .unwrap_err();
    assert_eq!(err.to_string(), "max_forks must be at least 1");
}

#[tokio::test]
async fn operator_construction_rejects_arity_mismatch() {
    let a = Arc::new(Dfv::<i64>::new());
    let output = Arc::new(Dfq::<i64>::new());
    let options = OperatorOptions::builder()
        .input(InputChannel::dfv(a))
        .output(output)
        .build()
        .unwrap();
    let err = Operator::start(options, AddBody, Pool::current()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "operator has 1 input(s) but the body declares arity 2"
    );
}

#[derive(Default)]
struct BatchBlockingActor {
    batches: Vec<(i32, Option<i32>)>,
}

impl BlockingActor for BatchBlockingActor {
    type Message = i32;
    type ObservableState = Vec<(i32, Option<i32>)>;

    fn observable_state(&self) -> Self::ObservableState {
        self.batches.clone()
    }

    fn process_message(
        &mut self,
        message: i32,
        ctx: &mut BlockingContext<Self>,
    ) -> anyhow::Result<BlockingOutcome> {
        let second = ctx.receive(Some(Duration::from_millis(200)));
        self.batches.push((message, second));
        Ok(BlockingOutcome::Continue)
    }
}

#[tokio::test]
async fn blocking_actor_pulls_a_second_message_via_receive() {
    let kill_switch = KillSwitch::default();
    let (mailbox, handle) =
        BatchBlockingActor::default().spawn(Pool::current(), None, kill_switch);
    mailbox.send_anonymous(1).await.unwrap();
    mailbox.send_anonymous(2).await.unwrap();

    for _ in 0..30 {
        if let Observation::Running(batches) = handle.observe().await {
            if !batches.is_empty() {
                assert_eq!(batches[0], (1, Some(2)));
                handle.stop();
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("blocking actor never observed its batch");
}

struct DeliveryProbeActor {
    target: Mailbox<String>,
    delivery_failed: bool,
}

#[async_trait]
impl ReactiveActor for DeliveryProbeActor {
    type Message = ();
    type ObservableState = bool;

    fn observable_state(&self) -> bool {
        self.delivery_failed
    }

    async fn react(
        &mut self,
        _message: (),
        _ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome> {
        self.delivery_failed = self.target.send("ping".to_string()).await.is_err();
        Ok(ReactOutcome::Stop)
    }
}

#[tokio::test]
async fn send_after_receiver_stopped_observes_a_delivery_failure() {
    let pong_kill_switch = KillSwitch::default();
    let (pong_mailbox, pong_handle) = PongActor.spawn(Pool::current(), None, pong_kill_switch);
    pong_handle.stop();
    pong_handle.join().await;

    let prober_kill_switch = KillSwitch::default();
    let (prober_mailbox, prober_handle) = DeliveryProbeActor {
        target: pong_mailbox,
        delivery_failed: false,
    }
    .spawn(Pool::current(), None, prober_kill_switch);
    prober_mailbox.send_anonymous(()).await.unwrap();

    for _ in 0..20 {
        if let Observation::Running(true) | Observation::Terminated(true) =
            prober_handle.observe().await
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("prober never observed a delivery failure");
}

#[tokio::test]
async fn dfq_whenever_bound_fires_for_every_bound_value() {
    let q = Arc::new(Dfq::<i32>::new());
    let seen: Arc<std::sync::Mutex<Vec<i32>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    q.whenever_bound(move |value| seen_clone.lock().unwrap().push(value));

    q.left_shift(1);
    q.left_shift(2);
    q.left_shift(3);

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn dfq_when_bound_fires_only_once() {
    let q = Arc::new(Dfq::<i32>::new());
    let seen: Arc<std::sync::Mutex<Vec<i32>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    q.when_bound(move |value| seen_clone.lock().unwrap().push(value));

    q.left_shift(1);
    q.left_shift(2);

    assert_eq!(*seen.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn send_and_wait_returns_the_reply_payload() {
    let kill_switch = KillSwitch::default();
    let (_pong_mailbox, pong_handle) = PongActor.spawn(Pool::current(), None, kill_switch);
    let reply: PingMessage = pong_handle
        .send_and_wait("ping".to_string(), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(matches!(reply, PingMessage::Pong));
    pong_handle.stop();
}

#[tokio::test]
async fn send_and_wait_times_out_when_no_reply_arrives() {
    let kill_switch = KillSwitch::default();
    let (_pong_mailbox, pong_handle) = PongActor.spawn(Pool::current(), None, kill_switch);
    let err = pong_handle
        .send_and_wait::<PingMessage>("not-ping".to_string(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::Timeout));
    pong_handle.stop();
}
