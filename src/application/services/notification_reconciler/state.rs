use std::time::Duration;

/// 購読が落ちた理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ChannelError,
    TimedOut,
    Closed,
    OpenFailed,
}

/// リアルタイム購読の状態。FallbackPolling は可視化イベントまで抜けない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionPhase {
    Init,
    Subscribing { attempt: u32 },
    Subscribed,
    Error { attempt: u32, reason: FailureReason },
    Retrying { attempt: u32 },
    FallbackPolling,
    Closed,
}

/// 状態遷移に伴って呼び出し側が行うこと。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Subscribe,
    ScheduleRetry(Duration),
    StartPolling,
    StopPolling,
    Recover(Duration),
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub recovery_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct SubscriptionMachine {
    phase: SubscriptionPhase,
    retries_used: u32,
    policy: RetryPolicy,
}

impl SubscriptionMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            phase: SubscriptionPhase::Init,
            retries_used: 0,
            policy,
        }
    }

    pub fn phase(&self) -> &SubscriptionPhase {
        &self.phase
    }

    pub fn retries_used(&self) -> u32 {
        self.retries_used
    }

    pub fn start(&mut self) -> Transition {
        match self.phase {
            SubscriptionPhase::Init => {
                self.phase = SubscriptionPhase::Subscribing { attempt: 0 };
                Transition::Subscribe
            }
            _ => Transition::Stay,
        }
    }

    pub fn on_subscribed(&mut self) -> Transition {
        match self.phase {
            SubscriptionPhase::Subscribing { .. } => {
                self.phase = SubscriptionPhase::Subscribed;
                self.retries_used = 0;
                Transition::Stay
            }
            _ => Transition::Stay,
        }
    }

    /// Subscribing / Subscribed からの失敗だけを Error に落とす。
    pub fn on_failure(&mut self, reason: FailureReason) -> Transition {
        match self.phase {
            SubscriptionPhase::Subscribing { .. } | SubscriptionPhase::Subscribed => {
                self.phase = SubscriptionPhase::Error {
                    attempt: self.retries_used,
                    reason,
                };
                Transition::Escalate
            }
            _ => Transition::Stay,
        }
    }

    /// Error から再試行か、予算切れならポーリングへ。
    pub fn escalate(&mut self) -> Transition {
        if !matches!(self.phase, SubscriptionPhase::Error { .. }) {
            return Transition::Stay;
        }
        if self.retries_used < self.policy.max_retries {
            self.retries_used += 1;
            self.phase = SubscriptionPhase::Retrying {
                attempt: self.retries_used,
            };
            Transition::ScheduleRetry(self.policy.retry_delay)
        } else {
            self.phase = SubscriptionPhase::FallbackPolling;
            Transition::StartPolling
        }
    }

    pub fn on_retry_elapsed(&mut self) -> Transition {
        match self.phase {
            SubscriptionPhase::Retrying { attempt } => {
                self.phase = SubscriptionPhase::Subscribing { attempt };
                Transition::Subscribe
            }
            _ => Transition::Stay,
        }
    }

    pub fn on_visible(&mut self) -> Transition {
        match self.phase {
            SubscriptionPhase::FallbackPolling => {
                self.retries_used = 0;
                self.phase = SubscriptionPhase::Retrying { attempt: 0 };
                Transition::Recover(self.policy.recovery_delay)
            }
            _ => Transition::Stay,
        }
    }

    pub fn close(&mut self) -> Transition {
        let was_polling = self.phase == SubscriptionPhase::FallbackPolling;
        self.phase = SubscriptionPhase::Closed;
        if was_polling {
            Transition::StopPolling
        } else {
            Transition::Stay
        }
    }
}
