use neon_fiber::log::{LogLevel, Logger, get_log_level, reset_logger, set_log_level, set_logger};
use neon_fiber::{Channel, CoExecutor, Executor, FiberError, Future, TpExecutor};
use serial_test::serial;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// 启动 n 个工作线程，返回它们的句柄
fn spawn_workers<E: Executor>(exec: &E, n: usize) -> Vec<JoinHandle<()>> {
    (0..n)
        .map(|_| {
            let exec = exec.clone();
            thread::spawn(move || {
                let thread = exec.adopt_thread();
                exec.resume(&thread);
                exec.unadopt_thread(thread);
            })
        })
        .collect()
}

fn stop_workers<E: Executor>(exec: &E, workers: Vec<JoinHandle<()>>) {
    exec.shutdown();
    for w in workers {
        w.join().unwrap();
    }
}

/// 生产者和消费者通过有界通道传 0..10，消费者返回总和
fn producer_consumer<E: Executor>(exec: &E) -> i32 {
    let ch = Arc::new(Channel::new());

    let rx = ch.clone();
    let consumer = exec.create_task(move |cx| (0..10).map(|_| rx.get(cx)).sum::<i32>());
    let tx = ch.clone();
    let producer = exec.create_task(move |cx| {
        for i in 0..10 {
            tx.put(cx, i);
        }
    });

    let sum = consumer.queue_start().unwrap();
    let done = producer.queue_start().unwrap();

    let main = exec.adopt_thread();
    let cx = main.context();
    assert_eq!(done.wait(&cx), Ok(()));
    sum.wait(&cx).unwrap()
}

#[test]
fn test_producer_consumer_single_thread() {
    let exec = CoExecutor::new();
    assert_eq!(producer_consumer(&exec), 45);
}

#[test]
fn test_producer_consumer_worker_threads() {
    let exec = CoExecutor::new();
    let workers = spawn_workers(&exec, 3);
    assert_eq!(producer_consumer(&exec), 45);
    stop_workers(&exec, workers);
}

#[test]
fn test_producer_consumer_thread_pool() {
    let exec = TpExecutor::new();
    let workers = spawn_workers(&exec, 2);
    assert_eq!(producer_consumer(&exec), 45);
    stop_workers(&exec, workers);
}

#[test]
fn test_wait_after_resume_pending() {
    let exec = CoExecutor::new();
    let thread = exec.adopt_thread();
    let result = exec.create_task(|_cx| 5).queue_start().unwrap();
    assert!(exec.resume_pending(&thread));
    assert_eq!(result.wait(&thread.context()), Ok(5));
}

fn many_tasks<E: Executor>(exec: &E, workers: usize) {
    const N: usize = 200;
    let handles = spawn_workers(exec, workers);

    let futures: Vec<_> = (0..N)
        .map(|i| {
            exec.create_task(move |cx| {
                cx.yield_now();
                i * 2
            })
            .queue_start()
            .unwrap()
        })
        .collect();

    let main = exec.adopt_thread();
    let cx = main.context();
    let total: usize = futures.iter().map(|f| f.wait(&cx).unwrap()).sum();
    assert_eq!(total, (0..N).map(|i| i * 2).sum());

    stop_workers(exec, handles);
    let stats = exec.stats();
    assert_eq!(stats.created, N);
    assert_eq!(stats.completed, N);
    assert_eq!(stats.panicked, 0);
    assert!(stats.scheduled >= N);
}

#[test]
fn test_many_tasks_fiber() {
    many_tasks(&CoExecutor::new(), 4);
}

#[test]
fn test_many_tasks_thread_pool() {
    many_tasks(&TpExecutor::new(), 4);
}

#[test]
fn test_cross_task_rendezvous() {
    // 任务在另一个任务的结果上挂起，结果由其他工作线程产生
    let exec = CoExecutor::new();
    let workers = spawn_workers(&exec, 2);

    let first = exec.create_task(|cx| {
        for _ in 0..10 {
            cx.yield_now();
        }
        "ready"
    });
    let pending = first.future();
    let second = exec.create_task(move |cx| pending.wait(cx).map(|s| s.len()));

    let result = second.queue_start().unwrap();
    first.queue_start().unwrap();

    let main = exec.adopt_thread();
    assert_eq!(result.wait(&main.context()), Ok(Ok(5)));
    stop_workers(&exec, workers);
}

#[test]
fn test_rendezvous_across_executors() {
    // 两个执行器各有一个工作线程，通过同一个 Future 交接结果
    let a = CoExecutor::new();
    let b = CoExecutor::new();
    let workers_a = spawn_workers(&a, 1);
    let workers_b = spawn_workers(&b, 1);

    // 等待方用第三个执行器接管主线程，唤醒同样跨执行器
    let home = CoExecutor::new();
    let main = home.adopt_thread();
    let cx = main.context();

    for round in 0..20 {
        let shared = Arc::new(Future::new());

        let rx = shared.clone();
        let consumer = a.create_task(move |cx| rx.wait(cx)).queue_start().unwrap();
        let tx = shared.clone();
        let producer = b
            .create_task(move |cx| {
                for _ in 0..round % 4 {
                    cx.yield_now();
                }
                tx.set_result(5)
            })
            .queue_start()
            .unwrap();

        assert_eq!(consumer.wait(&cx), Ok(5));
        assert_eq!(producer.wait(&cx), Ok(Ok(())));
    }

    stop_workers(&a, workers_a);
    stop_workers(&b, workers_b);
}

#[test]
fn test_put_blocks_when_full() {
    let exec = CoExecutor::new();
    let thread = exec.adopt_thread();
    let ch = Arc::new(Channel::new());

    let tx = ch.clone();
    let producer = exec.create_task(move |cx| {
        for i in 0..17 {
            tx.put(cx, i);
        }
    });
    let done = producer.queue_start().unwrap();

    // 第 17 个元素放不进去，生产者让出
    assert!(exec.resume_pending(&thread));
    assert_eq!(ch.len(), ch.capacity());
    assert!(!producer.is_finished());

    assert_eq!(ch.try_get(), Some(0));
    assert!(exec.resume_pending(&thread));
    assert!(producer.is_finished());
    assert_eq!(done.get(), Some(Ok(())));
    assert_eq!(ch.len(), 16);
}

#[test]
#[serial]
fn test_panicking_task_reports_error() {
    let saved = get_log_level();
    set_log_level(LogLevel::Off);

    let exec = CoExecutor::new();
    let thread = exec.adopt_thread();
    let task = exec.builder("doomed").create(|_cx| -> u32 { panic!("out of cheese") }).unwrap();
    let result = task.queue_start().unwrap();
    let survivor = exec.create_task(|_cx| 1u32).queue_start().unwrap();
    while exec.resume_pending(&thread) {}

    match result.get() {
        Some(Err(FiberError::TaskPanicked { task: ident, message })) => {
            assert_eq!(ident.name(), "doomed");
            assert_eq!(message, "out of cheese");
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(survivor.get(), Some(Ok(1)));
    assert_eq!(exec.stats().panicked, 1);
    assert_eq!(exec.stats().completed, 1);

    set_log_level(saved);
}

#[test]
fn test_queue_start_twice() {
    let exec = TpExecutor::new();
    let task = exec.create_task(|_cx| ());
    task.queue_start().unwrap();
    assert_eq!(task.queue_start().err(), Some(FiberError::AlreadyQueued(task.ident())));
}

#[test]
fn test_builder_errors() {
    let exec = CoExecutor::new();
    let err = exec.builder("tiny").stack_size(1024).create(|_cx| ()).err();
    assert_eq!(err, Some(FiberError::InvalidStackSize { size: 1024, min: 16 * 1024 }));

    let task = exec.builder("big").stack_size(256 * 1024 + 1).create(|_cx| ()).unwrap();
    assert_eq!(task.ident().name(), "big");

    exec.shutdown();
    assert!(exec.is_shutdown());
    let err = exec.builder("late").create(|_cx| ()).err();
    assert_eq!(err, Some(FiberError::ExecutorShutdown));
}

#[test]
fn test_shutdown_drains_queue() {
    let exec = CoExecutor::new();
    let futures: Vec<_> = (0..5)
        .map(|i| exec.create_task(move |_cx| i).queue_start().unwrap())
        .collect();
    exec.shutdown();

    // 关闭后调度循环先运行完已排队的任务才退出
    let thread = exec.adopt_thread();
    exec.resume(&thread);
    for (i, f) in futures.iter().enumerate() {
        assert_eq!(f.get(), Some(Ok(i)));
    }
}

struct CountingLogger(AtomicUsize);

impl Logger for CountingLogger {
    fn log(&self, _level: LogLevel, _args: fmt::Arguments<'_>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

static LINES: CountingLogger = CountingLogger(AtomicUsize::new(0));

#[test]
#[serial]
fn test_shutdown_quiet_at_default_level() {
    let saved = get_log_level();
    set_log_level(LogLevel::Info);
    LINES.0.store(0, Ordering::SeqCst);
    set_logger(&LINES);

    let exec = CoExecutor::new();
    let thread = exec.adopt_thread();
    exec.shutdown();
    exec.resume(&thread);
    drop(thread);
    TpExecutor::new().shutdown();

    reset_logger();
    set_log_level(saved);
    assert_eq!(LINES.0.load(Ordering::SeqCst), 0);
}
