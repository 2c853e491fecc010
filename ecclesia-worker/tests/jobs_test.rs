/// Worker job tests against a real database
///
/// Skipped when `DATABASE_URL` is not set. Other tests may share the
/// database, so assertions only look at rows created here.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ecclesia_shared::{
    auth::{
        password::hash_password,
        scope::Scope,
        session::{SessionData, SessionStore},
        token::generate_session_id,
    },
    db::migrations::run_migrations,
    mail::{LinkTracker, MailError, Mailer, OutgoingEmail},
    models::{
        campaign::{Campaign, CampaignStatus, CreateCampaign},
        email_log::{EmailLog, EmailStatus},
        event::{Event, EventInput},
        hierarchy::HierarchyIds,
        organization::{CreateOrganization, Organization},
        rsvp::{Rsvp, RsvpInput, RsvpStatus},
        user::{AccountStatus, CreateUser, RoleLevel, User},
    },
};
use ecclesia_worker::jobs::{CampaignDispatcher, Job, ReminderJob, SessionSweeper};
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const BASE_URL: &str = "https://members.example.org";

fn tracker() -> LinkTracker {
    LinkTracker::new(BASE_URL, "jobs-test-secret")
}

/// Jobs scan the whole database; one test at a time keeps each test's mail
/// in its own mailer
static JOB_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Mailer that records messages and fails for chosen recipients
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    reject: Vec<String>,
}

impl RecordingMailer {
    fn rejecting(address: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: vec![address.to_string()],
        }
    }

    fn sent_to(&self, address: &str) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.to_email == address)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, MailError> {
        if self.reject.contains(&email.to_email) {
            return Err(MailError::Rejected {
                status: 422,
                body: "mailbox unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(Some(format!("msg-{}", Uuid::new_v4())))
    }
}

struct Fixture {
    db: PgPool,
    church: Organization,
}

impl Fixture {
    async fn new() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let db = PgPool::connect(&url).await.expect("connect to test database");
        run_migrations(&db).await.expect("apply migrations");

        let suffix = Uuid::new_v4().simple().to_string();
        let church = Organization::create(
            &db,
            CreateOrganization {
                name: format!("St. Worker {}", &suffix[..8]),
                slug: Some(format!("st-worker-{}", suffix)),
                contact_email: None,
                max_users: 0,
                province_id: None,
                diocese_id: None,
            },
        )
        .await
        .expect("create church");

        Some(Self { db, church })
    }

    async fn member(&self, first_name: &str, role: RoleLevel) -> User {
        let mut conn = self.db.acquire().await.expect("acquire connection");
        User::create(
            &mut *conn,
            CreateUser {
                organization_id: self.church.id,
                email: format!("{}-{}@example.org", first_name.to_lowercase(), Uuid::new_v4()),
                password_hash: hash_password("Harvest2025Praise").expect("hash password"),
                first_name: first_name.to_string(),
                last_name: "Mensah".to_string(),
                other_names: None,
                phone: None,
                gender: None,
                role_level: role,
                account_status: AccountStatus::Active,
                hierarchy: HierarchyIds::default(),
                verification_token_hash: None,
            },
        )
        .await
        .expect("create member")
    }

    async fn event(&self, admin: &User, starts_in: Duration) -> Event {
        self.titled_event(admin, "Harvest Thanksgiving", starts_in).await
    }

    async fn titled_event(&self, admin: &User, title: &str, starts_in: Duration) -> Event {
        Event::create(
            &self.db,
            self.church.id,
            admin.id,
            EventInput {
                title: title.to_string(),
                description: None,
                location: Some("Church hall".to_string()),
                starts_at: Utc::now() + starts_in,
                ends_at: None,
                capacity: None,
                parish_id: None,
            },
        )
        .await
        .expect("create event")
    }

    async fn cleanup(&self) {
        sqlx::query("DELETE FROM users WHERE organization_id = $1")
            .bind(self.church.id)
            .execute(&self.db)
            .await
            .expect("delete users");
        sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(self.church.id)
            .execute(&self.db)
            .await
            .expect("delete church");
    }
}

#[tokio::test]
async fn test_reminders_go_to_attendees_once() {
    let Some(fx) = Fixture::new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let _guard = JOB_LOCK.lock().await;

    let admin = fx.member("Grace", RoleLevel::ParishAdmin).await;
    let attending = fx.member("Kofi", RoleLevel::Member).await;
    let declined = fx.member("Esi", RoleLevel::Member).await;

    let soon = fx.event(&admin, Duration::hours(2)).await;
    let later = fx.event(&admin, Duration::days(10)).await;

    for (user, status) in [(&attending, RsvpStatus::Attending), (&declined, RsvpStatus::Declined)] {
        Rsvp::upsert(
            &fx.db,
            fx.church.id,
            soon.id,
            user.id,
            RsvpInput {
                status,
                guests: 0,
                note: None,
            },
        )
        .await
        .expect("respond");
    }

    let mailer = Arc::new(RecordingMailer::default());
    let job = ReminderJob::new(fx.db.clone(), mailer.clone(), Duration::hours(24), tracker());

    job.run_once().await.expect("reminder pass");

    let emails = mailer.sent_to(&attending.email);
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].subject, "Reminder: Harvest Thanksgiving");
    assert!(emails[0].html_body.contains("Dear Kofi"));
    assert!(emails[0].html_body.contains(&format!("{}/t/open/", BASE_URL)));
    assert!(mailer.sent_to(&declined.email).is_empty());

    let soon_after = Event::find_by_id(&fx.db, Some(fx.church.id), soon.id)
        .await
        .unwrap()
        .unwrap();
    assert!(soon_after.reminder_sent);

    let later_after = Event::find_by_id(&fx.db, Some(fx.church.id), later.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!later_after.reminder_sent);

    let logged: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM email_logs WHERE event_id = $1 AND status = 'sent' AND kind = 'reminder'",
    )
    .bind(soon.id)
    .fetch_one(&fx.db)
    .await
    .unwrap();
    assert_eq!(logged.0, 1);

    // A second pass finds nothing new for this event
    job.run_once().await.expect("second pass");
    assert_eq!(mailer.sent_to(&attending.email).len(), 1);

    fx.cleanup().await;
}

#[tokio::test]
async fn test_reminders_fall_back_to_all_members() {
    let Some(fx) = Fixture::new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let _guard = JOB_LOCK.lock().await;

    let admin = fx.member("Grace", RoleLevel::ParishAdmin).await;
    let member = fx.member("Yaw", RoleLevel::Member).await;
    fx.event(&admin, Duration::hours(3)).await;

    let mailer = Arc::new(RecordingMailer::default());
    ReminderJob::new(fx.db.clone(), mailer.clone(), Duration::hours(24), tracker())
        .run_once()
        .await
        .expect("reminder pass");

    assert_eq!(mailer.sent_to(&admin.email).len(), 1);
    assert_eq!(mailer.sent_to(&member.email).len(), 1);

    fx.cleanup().await;
}

#[tokio::test]
async fn test_long_event_title_does_not_block_later_reminders() {
    let Some(fx) = Fixture::new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let _guard = JOB_LOCK.lock().await;

    let admin = fx.member("Grace", RoleLevel::ParishAdmin).await;
    let member = fx.member("Akosua", RoleLevel::Member).await;

    // "Reminder: " plus this title is wider than the subject column
    let long_title = "Diocesan Synod ".repeat(17)[..250].to_string();
    let long = fx.titled_event(&admin, &long_title, Duration::minutes(30)).await;
    let normal = fx.event(&admin, Duration::hours(2)).await;

    let mailer = Arc::new(RecordingMailer::default());
    let job = ReminderJob::new(fx.db.clone(), mailer.clone(), Duration::hours(24), tracker());
    job.run_once().await.expect("first pass");
    job.run_once().await.expect("second pass");

    let emails = mailer.sent_to(&member.email);
    assert_eq!(emails.len(), 2);
    assert!(emails.iter().any(|e| e.subject == "Reminder: Harvest Thanksgiving"));

    for event in [&long, &normal] {
        let after = Event::find_by_id(&fx.db, Some(fx.church.id), event.id)
            .await
            .unwrap()
            .unwrap();
        assert!(after.reminder_sent);
    }

    let subject: (String,) = sqlx::query_as(
        "SELECT subject FROM email_logs WHERE event_id = $1 AND user_id = $2",
    )
    .bind(long.id)
    .bind(member.id)
    .fetch_one(&fx.db)
    .await
    .unwrap();
    assert_eq!(subject.0.chars().count(), 255);
    assert!(subject.0.starts_with("Reminder: Diocesan Synod"));

    fx.cleanup().await;
}

#[tokio::test]
async fn test_campaign_delivery_records_failures_and_finalizes() {
    let Some(fx) = Fixture::new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let _guard = JOB_LOCK.lock().await;

    let admin = fx.member("Grace", RoleLevel::ParishAdmin).await;
    let member = fx.member("Abena", RoleLevel::Member).await;
    let unreachable = fx.member("Kwame", RoleLevel::Member).await;

    let campaign = Campaign::create(
        &fx.db,
        fx.church.id,
        admin.id,
        CreateCampaign {
            subject: "News for {{first_name}}".to_string(),
            body_template: "Dear {{full_name}},\n\nWelcome to {{church}}.".to_string(),
            event_id: None,
            attendees_only: false,
        },
    )
    .await
    .expect("create campaign");

    let queued = Campaign::queue(
        &fx.db,
        Some(fx.church.id),
        campaign.id,
        &Scope::Everything.to_sql("u", 1),
    )
    .await
    .expect("queue campaign");
    assert_eq!(queued.recipient_count, 3);

    let mailer = Arc::new(RecordingMailer::rejecting(&unreachable.email));
    let dispatcher = CampaignDispatcher::new(fx.db.clone(), mailer.clone(), 100, tracker());

    // Other tests may have queued mail too; keep going until ours is out
    for _ in 0..10 {
        dispatcher.run_once().await.expect("dispatch pass");
        let stats = EmailLog::stats_for_campaign(&fx.db, campaign.id).await.unwrap();
        if stats.queued == 0 {
            break;
        }
    }

    let emails = mailer.sent_to(&member.email);
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].subject, "News for Abena");
    assert!(emails[0].html_body.contains("<p>Dear Abena Mensah,</p>"));
    assert_eq!(emails[0].to_name.as_deref(), Some("Abena Mensah"));

    let stats = EmailLog::stats_for_campaign(&fx.db, campaign.id).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.failed, 1);

    let failed: (EmailStatus, Option<String>) = sqlx::query_as(
        "SELECT status, error FROM email_logs WHERE campaign_id = $1 AND user_id = $2",
    )
    .bind(campaign.id)
    .bind(unreachable.id)
    .fetch_one(&fx.db)
    .await
    .unwrap();
    assert_eq!(failed.0, EmailStatus::Failed);
    assert!(failed.1.unwrap_or_default().contains("mailbox unavailable"));

    let finished = Campaign::find(&fx.db, Some(fx.church.id), campaign.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(finished.status, CampaignStatus::Sent);

    fx.cleanup().await;
}

#[tokio::test]
async fn test_session_sweeper_removes_only_expired() {
    let Some(fx) = Fixture::new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let _guard = JOB_LOCK.lock().await;

    let member = fx.member("Efua", RoleLevel::Member).await;
    let store = SessionStore::new(fx.db.clone(), Duration::minutes(30));

    let (fresh, _) = generate_session_id();
    let (stale, stale_hash) = generate_session_id();
    let data = SessionData::for_user(&member);
    assert!(store.create(&fresh, &data).await);
    assert!(store.create(&stale, &data).await);

    sqlx::query(
        "UPDATE sessions SET last_activity = NOW() - INTERVAL '2 hours' WHERE id = $1",
    )
    .bind(&stale_hash)
    .execute(&fx.db)
    .await
    .unwrap();

    let report = SessionSweeper::new(store.clone())
        .run_once()
        .await
        .expect("sweep");
    assert!(report.processed >= 1);

    assert!(store.read(&fresh).await.is_authenticated());
    assert!(!store.read(&stale).await.is_authenticated());

    let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = $1")
        .bind(member.id)
        .fetch_one(&fx.db)
        .await
        .unwrap();
    assert_eq!(remaining.0, 1);

    fx.cleanup().await;
}
