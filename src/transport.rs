//! # Transport モジュール
//!
//! エージェント間の位置共有を `tokio::sync::watch` チャネルで実現します。
//!
//! エージェントごとに1本のチャネルを持ち、`Vector3` を値ごと置き換えます。
//! 読み手は常に完全な値を観測するため、古い座標と新しい座標が混ざった
//! 位置を読むことはありません。更新が届いていない他機は
//! `has_changed` が false となり、受信側では前回値が維持されます。

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{AgentId, IPositionFeed, IStateSink, KinematicState, Vector3};

/// 全エージェントの最新位置を保持する掲示板
#[derive(Debug, Clone)]
pub struct PositionBoard {
    senders: Arc<[watch::Sender<Vector3>]>,
}

impl PositionBoard {
    /// 初期位置で掲示板を作成
    pub fn new(initial: &[Vector3]) -> Self {
        let senders: Vec<watch::Sender<Vector3>> = initial
            .iter()
            .map(|position| watch::channel(*position).0)
            .collect();
        Self {
            senders: senders.into(),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.senders.len()
    }

    /// 指定エージェント用の受信フィード（自機を含む全チャネルを購読）
    pub fn feed_for(&self, agent_id: AgentId) -> BoardFeed {
        BoardFeed {
            agent_id,
            receivers: self.senders.iter().map(|s| s.subscribe()).collect(),
        }
    }

    /// 指定エージェント用の送信シンク
    pub fn sink_for(&self, agent_id: AgentId) -> BoardSink {
        BoardSink {
            senders: Arc::clone(&self.senders),
            agent_id,
        }
    }

    /// 全エージェントの現在位置
    pub fn snapshot(&self) -> Vec<Vector3> {
        self.senders.iter().map(|s| *s.borrow()).collect()
    }
}

/// 掲示板からの位置フィード
#[derive(Debug)]
pub struct BoardFeed {
    agent_id: AgentId,
    receivers: Vec<watch::Receiver<Vector3>>,
}

impl BoardFeed {
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }
}

impl IPositionFeed for BoardFeed {
    fn poll(&mut self) -> Vec<(AgentId, Vector3)> {
        let mut updates = Vec::new();
        for (id, receiver) in self.receivers.iter_mut().enumerate() {
            // 送信側が閉じた場合も前回値を使い続ける
            if let Ok(true) = receiver.has_changed() {
                updates.push((id, *receiver.borrow_and_update()));
            }
        }
        updates
    }
}

/// 掲示板への位置出力
#[derive(Debug, Clone)]
pub struct BoardSink {
    senders: Arc<[watch::Sender<Vector3>]>,
    agent_id: AgentId,
}

impl IStateSink for BoardSink {
    fn publish(&mut self, agent_id: AgentId, state: &KinematicState) {
        debug_assert_eq!(agent_id, self.agent_id);
        if let Some(sender) = self.senders.get(self.agent_id) {
            sender.send_replace(state.position);
        }
    }
}
