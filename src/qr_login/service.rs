use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::auth::{AuthService, Deadline, IssuedToken};
use crate::cache::{CachedQrSession, SessionStore};
use crate::error::{AuthError, AuthResult};
use crate::infrastructure::{QrCodeProvider, SessionNotifier};
use crate::qr_login::QrState;
use crate::utils::token_prefix;

/// 会话令牌：32 位十六进制随机串
const SESSION_TOKEN_LEN: usize = 32;

/// 新建会话返回给 Web 端的内容
#[derive(Debug, Clone)]
pub struct QrSessionTicket {
    pub token: String,
    pub image: Vec<u8>,
}

/// 轮询端看到的会话状态，确认后携带身份令牌
#[derive(Debug, Clone, Serialize)]
pub struct QrSessionView {
    pub state: QrState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn is_well_formed(token: &str) -> bool {
    token.len() == SESSION_TOKEN_LEN && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// 扫码登录状态机
///
/// ```text
/// PendingScan --scan-->      Scanned
/// Scanned     --authorize--> Authorizing
/// Scanned|Authorizing --cancel--> Cancelled
/// Authorizing --complete-->  Confirmed
/// (any)       --lease lapse--> 记录消失
/// ```
///
/// 更新操作只校验目标状态和 Confirmed 终态，不校验其他来源状态，也不做比较并交换：
/// 同一会话上两个客户端的并发写入以存储收到的顺序为准，后写覆盖先写，
/// 迟到的旧状态可能覆盖较新的状态。读取方必须容忍状态被跳过或覆盖。
#[derive(Clone)]
pub struct QrLoginService {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn QrCodeProvider>,
    notifier: Arc<dyn SessionNotifier>,
    auth: AuthService,
    lease: Duration,
}

impl QrLoginService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn QrCodeProvider>,
        notifier: Arc<dyn SessionNotifier>,
        auth: AuthService,
        lease: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
            auth,
            lease,
        }
    }

    async fn load(&self, token: &str, deadline: Deadline) -> AuthResult<CachedQrSession> {
        if !is_well_formed(token) {
            return Err(AuthError::SessionExpired);
        }
        deadline
            .run(self.store.get(token))
            .await?
            .ok_or(AuthError::SessionExpired)
    }

    async fn notify(&self, token: &str, state: QrState, deadline: Deadline) {
        let publish = self.notifier.publish(token, state);
        match tokio::time::timeout_at(deadline.instant(), publish).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                "failed to notify qr session {} of state {}: {}",
                token_prefix(token),
                state.code(),
                e
            ),
            Err(_) => tracing::warn!(
                "notifying qr session {} of state {} exceeded request deadline",
                token_prefix(token),
                state.code()
            ),
        }
    }

    /// 创建会话：先申请二维码，再写入 PendingScan 记录，最后才把二维码交给调用方。
    /// 任一步失败都不会返回二维码。
    pub async fn create_session(&self, deadline: Deadline) -> AuthResult<QrSessionTicket> {
        let token = Uuid::new_v4().simple().to_string();

        let image = deadline.run(self.provider.provision(&token)).await?;

        let record = CachedQrSession {
            state: QrState::PendingScan.code(),
            token: None,
        };
        deadline
            .run(self.store.put(&token, &record, self.lease))
            .await?;

        tracing::info!("created qr session {}", token_prefix(&token));
        Ok(QrSessionTicket { token, image })
    }

    /// 轮询端读取会话状态，不续租
    pub async fn get_session(&self, token: &str, deadline: Deadline) -> AuthResult<QrSessionView> {
        let record = self.load(token, deadline).await?;
        let state = QrState::from_code(record.state).ok_or_else(|| {
            tracing::warn!(
                "qr session {} holds unknown state {}",
                token_prefix(token),
                record.state
            );
            AuthError::SessionExpired
        })?;
        Ok(QrSessionView {
            state,
            token: record.token,
        })
    }

    /// 扫码端推进会话状态，成功时覆盖状态并把租约重置为完整窗口
    pub async fn update_session(
        &self,
        token: &str,
        target_code: i32,
        deadline: Deadline,
    ) -> AuthResult<QrState> {
        let current = self.load(token, deadline).await?;
        // Confirmed 是终态，已交给轮询端的身份令牌不能被覆盖
        if current.state == QrState::Confirmed.code() {
            return Err(AuthError::InvalidStateTransition);
        }

        let target = QrState::from_code(target_code)
            .filter(|s| s.is_update_target())
            .ok_or(AuthError::InvalidStateTransition)?;

        // 读取与写入之间记录可能过期，此时写入会重新创建记录；
        // 租约到期后的下一次调用仍以“不存在”结束
        let record = CachedQrSession {
            state: target.code(),
            token: None,
        };
        deadline
            .run(self.store.put(token, &record, self.lease))
            .await?;

        self.notify(token, target, deadline).await;
        Ok(target)
    }

    /// 把已验证的用户绑定到处于 Authorizing 的会话，签发身份令牌并转入 Confirmed
    pub async fn complete_login(
        &self,
        token: &str,
        subject_id: i64,
        deadline: Deadline,
    ) -> AuthResult<IssuedToken> {
        let record = self.load(token, deadline).await?;
        if record.state != QrState::Authorizing.code() {
            return Err(AuthError::InvalidStateTransition);
        }

        let subject = self
            .auth
            .find_subject(subject_id, deadline)
            .await?
            .ok_or(AuthError::Authentication)?;
        let issued = self.auth.issue_token(subject.id, &subject.username)?;

        let record = CachedQrSession {
            state: QrState::Confirmed.code(),
            token: Some(issued.token.clone()),
        };
        deadline
            .run(self.store.put(token, &record, self.lease))
            .await?;

        tracing::info!(
            "qr session {} confirmed by subject {}",
            token_prefix(token),
            subject.id
        );
        self.notify(token, QrState::Confirmed, deadline).await;
        Ok(issued)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::auth::{CredentialKeyring, TokenIssuer};
    use crate::cache::MemorySessionStore;
    use crate::database::memory::MemoryAccountStore;
    use crate::infrastructure::ProvisionError;

    const LEASE: Duration = Duration::from_secs(300);

    #[derive(Default)]
    struct FakeProvider {
        fail: bool,
        scenes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QrCodeProvider for FakeProvider {
        async fn provision(&self, scene: &str) -> Result<Vec<u8>, ProvisionError> {
            if self.fail {
                return Err(ProvisionError::Status(500));
            }
            self.scenes.lock().unwrap().push(scene.to_owned());
            Ok(format!("PNG:{}", scene).into_bytes())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        fail: bool,
        stall: Option<Duration>,
        events: Mutex<Vec<(String, QrState)>>,
    }

    #[async_trait]
    impl SessionNotifier for RecordingNotifier {
        async fn publish(&self, token: &str, state: QrState) -> AuthResult<()> {
            self.events.lock().unwrap().push((token.to_owned(), state));
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            if self.fail {
                Err(AuthError::DownstreamUnavailable)
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        service: QrLoginService,
        store: Arc<MemorySessionStore>,
        provider: Arc<FakeProvider>,
        notifier: Arc<RecordingNotifier>,
        issuer: TokenIssuer,
    }

    fn harness_with(provider: FakeProvider, notifier: RecordingNotifier) -> Harness {
        let accounts = Arc::new(MemoryAccountStore::new());
        accounts.add_user(7, "alice", "unused", 1);
        let keyring =
            Arc::new(CredentialKeyring::new(&BTreeMap::from([(1, [1u8; 32])]), 1).unwrap());
        let issuer = TokenIssuer::new("qr-secret", 3600);
        let auth = AuthService::new(accounts, keyring, issuer.clone());

        let store = Arc::new(MemorySessionStore::new());
        let provider = Arc::new(provider);
        let notifier = Arc::new(notifier);
        let service = QrLoginService::new(
            store.clone(),
            provider.clone(),
            notifier.clone(),
            auth,
            LEASE,
        );
        Harness {
            service,
            store,
            provider,
            notifier,
            issuer,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeProvider::default(), RecordingNotifier::default())
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    async fn stored_state(h: &Harness, token: &str) -> Option<i32> {
        h.store.get(token).await.unwrap().map(|r| r.state)
    }

    #[tokio::test(start_paused = true)]
    async fn created_session_is_pending_and_image_carries_token() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();

        assert_eq!(ticket.token.len(), 32);
        assert_eq!(ticket.image, format!("PNG:{}", ticket.token).into_bytes());
        assert_eq!(h.provider.scenes.lock().unwrap().as_slice(), [ticket.token.clone()]);
        assert_eq!(stored_state(&h, &ticket.token).await, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_are_fresh_per_session() {
        let h = harness();
        let a = h.service.create_session(deadline()).await.unwrap();
        let b = h.service.create_session(deadline()).await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test(start_paused = true)]
    async fn provisioning_failure_fails_creation() {
        let h = harness_with(
            FakeProvider {
                fail: true,
                ..Default::default()
            },
            RecordingNotifier::default(),
        );
        assert!(matches!(
            h.service.create_session(deadline()).await,
            Err(AuthError::DownstreamUnavailable)
        ));
        assert!(h.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scan_moves_to_scanned() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();

        let state = h
            .service
            .update_session(&ticket.token, QrState::Scanned.code(), deadline())
            .await
            .unwrap();
        assert_eq!(state, QrState::Scanned);
        assert_eq!(stored_state(&h, &ticket.token).await, Some(2));
        assert_eq!(
            h.notifier.events.lock().unwrap().as_slice(),
            [(ticket.token.clone(), QrState::Scanned)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_target_is_rejected_without_mutation() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();

        for code in [0, 1, 5, 6, -3] {
            assert!(matches!(
                h.service.update_session(&ticket.token, code, deadline()).await,
                Err(AuthError::InvalidStateTransition)
            ));
        }
        assert_eq!(stored_state(&h, &ticket.token).await, Some(1));
        assert!(h.notifier.events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_token_is_expired() {
        let h = harness();
        let never = Uuid::new_v4().simple().to_string();
        assert!(matches!(
            h.service.update_session(&never, 2, deadline()).await,
            Err(AuthError::SessionExpired)
        ));
        assert!(matches!(
            h.service.update_session("../etc", 2, deadline()).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn session_expires_after_lease_without_activity() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();

        tokio::time::advance(LEASE + Duration::from_secs(1)).await;
        assert!(matches!(
            h.service.update_session(&ticket.token, 2, deadline()).await,
            Err(AuthError::SessionExpired)
        ));
        assert!(matches!(
            h.service.get_session(&ticket.token, deadline()).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn update_renews_lease_to_full_window() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();

        tokio::time::advance(LEASE - Duration::from_secs(1)).await;
        h.service
            .update_session(&ticket.token, 2, deadline())
            .await
            .unwrap();

        // 原截止时间已过，续租后仍然有效
        tokio::time::advance(Duration::from_secs(200)).await;
        let state = h
            .service
            .update_session(&ticket.token, 3, deadline())
            .await
            .unwrap();
        assert_eq!(state, QrState::Authorizing);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_does_not_renew_lease() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();

        tokio::time::advance(LEASE - Duration::from_secs(1)).await;
        let view = h.service.get_session(&ticket.token, deadline()).await.unwrap();
        assert_eq!(view.state, QrState::PendingScan);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(
            h.service.get_session(&ticket.token, deadline()).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn last_writer_wins() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();

        h.service.update_session(&ticket.token, 2, deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 3, deadline()).await.unwrap();
        // 迟到的 Scanned 覆盖了较新的 Authorizing
        h.service.update_session(&ticket.token, 2, deadline()).await.unwrap();
        assert_eq!(stored_state(&h, &ticket.token).await, Some(2));

        // 取消之后仍可被覆盖
        h.service.update_session(&ticket.token, 4, deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 3, deadline()).await.unwrap();
        assert_eq!(stored_state(&h, &ticket.token).await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn notifier_failure_does_not_fail_update() {
        let h = harness_with(
            FakeProvider::default(),
            RecordingNotifier {
                fail: true,
                ..Default::default()
            },
        );
        let ticket = h.service.create_session(deadline()).await.unwrap();
        let state = h
            .service
            .update_session(&ticket.token, 2, deadline())
            .await
            .unwrap();
        assert_eq!(state, QrState::Scanned);
        assert_eq!(h.notifier.events.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_login_confirms_and_hands_token_to_poller() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 2, deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 3, deadline()).await.unwrap();

        let issued = h
            .service
            .complete_login(&ticket.token, 7, deadline())
            .await
            .unwrap();
        let claims = h.issuer.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "alice");

        let view = h.service.get_session(&ticket.token, deadline()).await.unwrap();
        assert_eq!(view.state, QrState::Confirmed);
        assert_eq!(view.token.as_deref(), Some(issued.token.as_str()));
        assert_eq!(
            h.notifier.events.lock().unwrap().last().map(|(_, s)| *s),
            Some(QrState::Confirmed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_session_is_terminal() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 2, deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 3, deadline()).await.unwrap();
        let issued = h
            .service
            .complete_login(&ticket.token, 7, deadline())
            .await
            .unwrap();

        for code in [2, 3, 4] {
            assert!(matches!(
                h.service.update_session(&ticket.token, code, deadline()).await,
                Err(AuthError::InvalidStateTransition)
            ));
        }
        let view = h.service.get_session(&ticket.token, deadline()).await.unwrap();
        assert_eq!(view.state, QrState::Confirmed);
        assert_eq!(view.token.as_deref(), Some(issued.token.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_notifier_is_bounded_by_deadline() {
        let h = harness_with(
            FakeProvider::default(),
            RecordingNotifier {
                stall: Some(Duration::from_secs(120)),
                ..Default::default()
            },
        );
        let ticket = h.service.create_session(deadline()).await.unwrap();

        let started = tokio::time::Instant::now();
        let state = h
            .service
            .update_session(&ticket.token, 2, Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(state, QrState::Scanned);
        assert!(started.elapsed() <= Duration::from_secs(5));
        assert_eq!(stored_state(&h, &ticket.token).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn complete_login_requires_authorizing() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();
        assert!(matches!(
            h.service.complete_login(&ticket.token, 7, deadline()).await,
            Err(AuthError::InvalidStateTransition)
        ));

        h.service.update_session(&ticket.token, 2, deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 4, deadline()).await.unwrap();
        assert!(matches!(
            h.service.complete_login(&ticket.token, 7, deadline()).await,
            Err(AuthError::InvalidStateTransition)
        ));
        assert_eq!(stored_state(&h, &ticket.token).await, Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn complete_login_rejects_unknown_subject_and_expired_session() {
        let h = harness();
        let ticket = h.service.create_session(deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 2, deadline()).await.unwrap();
        h.service.update_session(&ticket.token, 3, deadline()).await.unwrap();

        assert!(matches!(
            h.service.complete_login(&ticket.token, 99, deadline()).await,
            Err(AuthError::Authentication)
        ));
        assert_eq!(stored_state(&h, &ticket.token).await, Some(3));

        tokio::time::advance(LEASE + Duration::from_secs(1)).await;
        assert!(matches!(
            h.service.complete_login(&ticket.token, 7, deadline()).await,
            Err(AuthError::SessionExpired)
        ));
    }
}
