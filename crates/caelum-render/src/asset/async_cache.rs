use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

/// 单个资源的加载状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed,
}

enum ResourceState<T> {
    Loading,
    Ready(Rc<T>),
    Failed,
}

type LoadResult<K, T> = (K, Result<T, String>);

/// 通用的异步资源缓存
///
/// 职责：
/// 1. 维护所有资源的状态（Loading -> Ready / Failed）。
/// 2. 管理后台 worker 线程，通过 channel 收发请求与结果。
/// 3. 提供 fallback 机制：未就绪时 `get` 返回占位资源，渲染循环永远不会
///    因为资源未加载完而阻塞或崩溃。
///
/// 阻塞点只有 worker 侧的 `recv`；渲染线程只 `try_recv`，每帧调用一次
/// [`Self::update`] 把已完成的结果收编进缓存。
pub struct AsyncResourceCache<K, T> {
    entries: HashMap<K, ResourceState<T>>,

    /// 占位资源，Loading/Failed 状态时返回它
    fallback: Rc<T>,

    /// 向 worker 发送加载请求；Drop 时先置 None 关闭 channel
    request_tx: Option<Sender<K>>,
    result_rx: Receiver<LoadResult<K, T>>,

    worker: Option<thread::JoinHandle<()>>,
}

// new & init
impl<K, T> AsyncResourceCache<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
{
    pub fn new(fallback: T, loader: impl Fn(&K) -> Result<T, String> + Send + 'static) -> Self {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<K>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<LoadResult<K, T>>();

        let worker = thread::Builder::new()
            .name("caelum-asset-worker".to_string())
            .spawn(move || {
                // sender 全部 drop 后 recv 返回 Err，线程退出
                while let Ok(key) = request_rx.recv() {
                    let result = loader(&key);
                    if result_tx.send((key, result)).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn asset worker thread");

        Self {
            entries: HashMap::new(),
            fallback: Rc::new(fallback),
            request_tx: Some(request_tx),
            result_rx,
            worker: Some(worker),
        }
    }
}

// tools
impl<K, T> AsyncResourceCache<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
{
    /// 请求加载资源，非阻塞
    ///
    /// 同一个 key 的在途/已完成请求会被去重：重复请求是 no-op，
    /// 不会触发第二次加载。
    pub fn request(&mut self, key: K) {
        if self.entries.contains_key(&key) {
            return;
        }

        self.entries.insert(key.clone(), ResourceState::Loading);
        if let Some(tx) = &self.request_tx
            && let Err(e) = tx.send(key)
        {
            log::error!("failed to send asset load request: {}", e);
        }
    }

    /// 获取资源
    ///
    /// Ready 时返回实际资源；Loading/Failed/未请求时返回 fallback
    pub fn get(&self, key: &K) -> Rc<T> {
        match self.entries.get(key) {
            Some(ResourceState::Ready(resource)) => resource.clone(),
            _ => self.fallback.clone(),
        }
    }

    pub fn status(&self, key: &K) -> Option<LoadStatus> {
        self.entries.get(key).map(|state| match state {
            ResourceState::Loading => LoadStatus::Loading,
            ResourceState::Ready(_) => LoadStatus::Ready,
            ResourceState::Failed => LoadStatus::Failed,
        })
    }

    #[inline]
    pub fn is_ready(&self, key: &K) -> bool {
        matches!(self.entries.get(key), Some(ResourceState::Ready(_)))
    }

    #[inline]
    pub fn fallback(&self) -> &Rc<T> {
        &self.fallback
    }

    /// 驱动加载流程，每帧调用一次
    ///
    /// 把 worker 已完成的结果收编进缓存；只 try_recv，不阻塞
    pub fn update(&mut self) {
        while let Ok((key, result)) = self.result_rx.try_recv() {
            match result {
                Ok(resource) => {
                    self.entries.insert(key, ResourceState::Ready(Rc::new(resource)));
                }
                Err(e) => {
                    log::error!("asset load failed: {}", e);
                    self.entries.insert(key, ResourceState::Failed);
                }
            }
        }
    }
}

impl<K, T> Drop for AsyncResourceCache<K, T> {
    fn drop(&mut self) {
        // 必须先 drop sender 关闭 channel，否则 worker 的 recv 一直阻塞，join 死锁
        self.request_tx = None;

        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::error!("failed to join asset worker thread");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;

    /// 轮询 update 直到 key 的状态落定，测试用
    fn wait_settled(cache: &mut AsyncResourceCache<String, u32>, key: &String) -> LoadStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            cache.update();
            match cache.status(key) {
                Some(LoadStatus::Loading) | None => {}
                Some(status) => return status,
            }
            assert!(Instant::now() < deadline, "asset worker did not settle in time");
            thread::yield_now();
        }
    }

    /// 就绪前返回 fallback，就绪后返回实际资源
    #[test]
    fn test_fallback_until_ready() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut cache = AsyncResourceCache::new(0u32, |key: &String| Ok(key.len() as u32));

        let key = "planet".to_string();
        assert!(Rc::ptr_eq(&cache.get(&key), cache.fallback()));

        cache.request(key.clone());
        assert_eq!(wait_settled(&mut cache, &key), LoadStatus::Ready);
        assert_eq!(*cache.get(&key), 6);
    }

    /// 同一个 key 的重复请求只触发一次加载
    #[test]
    fn test_request_dedup() {
        let load_count = Arc::new(AtomicUsize::new(0));
        let counter = load_count.clone();
        let mut cache = AsyncResourceCache::new(0u32, move |key: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(key.len() as u32)
        });

        let key = "moon".to_string();
        cache.request(key.clone());
        cache.request(key.clone());
        cache.request(key.clone());

        assert_eq!(wait_settled(&mut cache, &key), LoadStatus::Ready);
        cache.update();
        // 就绪后的重复请求同样是 no-op
        cache.request(key.clone());
        cache.update();

        assert_eq!(load_count.load(Ordering::SeqCst), 1);
    }

    /// 加载失败的资源保持 fallback，不会反复重试
    #[test]
    fn test_failed_keeps_fallback() {
        let mut cache =
            AsyncResourceCache::new(0u32, |_: &String| Err::<u32, _>("corrupt file".to_string()));

        let key = "broken".to_string();
        cache.request(key.clone());

        assert_eq!(wait_settled(&mut cache, &key), LoadStatus::Failed);
        assert!(Rc::ptr_eq(&cache.get(&key), cache.fallback()));
        assert!(!cache.is_ready(&key));
    }

    /// drop 关闭 channel 并 join worker，不会死锁
    #[test]
    fn test_drop_joins_worker() {
        let cache = AsyncResourceCache::new(0u32, |key: &String| Ok(key.len() as u32));
        drop(cache);
    }
}
