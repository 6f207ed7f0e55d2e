use std::sync::Arc;

use mailing_core::{
    domain::{
        attachments::{AttachmentContent, AttachmentError, StaticAttachment, UploadPlacement},
        mailing::{
            AttachmentOrigin, AttachmentOwner, Campaign, Mail, MailAssembler, MailService,
            MailServiceImpl,
        },
    },
    infrastructure::{
        db::memory::InMemoryDatabase,
        storage::{FilesystemStaticLibrary, FilesystemUploadStore},
    },
};
use testresult::TestResult;

struct Fixture {
    _library_dir: tempfile::TempDir,
    media_dir: tempfile::TempDir,
    db: InMemoryDatabase,
    library: Arc<FilesystemStaticLibrary>,
    uploads: Arc<FilesystemUploadStore>,
    mail_id: i64,
}

async fn fixture() -> anyhow::Result<Fixture> {
    let library_dir = tempfile::tempdir()?;
    let media_dir = tempfile::tempdir()?;

    tokio::fs::create_dir_all(library_dir.path().join("legal")).await?;
    tokio::fs::write(library_dir.path().join("legal/terms.txt"), "Be nice.").await?;
    tokio::fs::write(
        library_dir.path().join("legal/latin1.txt"),
        [b'c', b'a', b'f', 0xe9],
    )
    .await?;

    let db = InMemoryDatabase::new();
    let campaign_id = db
        .insert_campaign(Campaign {
            key: "spring-sale".to_string(),
            name: "Spring sale".to_string(),
            subject: "Spring sale".to_string(),
            prefix_subject: true,
            is_enabled: true,
            ..Default::default()
        })
        .await;
    let mail_id = db
        .insert_mail(Mail {
            campaign_id: Some(campaign_id),
            subject: "Spring sale starts today".to_string(),
            html_body: "<p>Hello</p>".to_string(),
            text_body: "Hello".to_string(),
            ..Default::default()
        })
        .await;

    let library = Arc::new(FilesystemStaticLibrary::new(library_dir.path()));
    let uploads = Arc::new(FilesystemUploadStore::new(
        media_dir.path(),
        UploadPlacement::custom(|mail_id, filename| format!("mails/{mail_id}/{filename}")),
    ));

    let service = MailServiceImpl::new(Arc::new(db.clone()), library.clone(), uploads.clone());

    service
        .add_static_attachment(
            AttachmentOwner::Campaign(campaign_id),
            StaticAttachment::new("legal/terms.txt"),
        )
        .await?;
    service
        .add_static_attachment(
            AttachmentOwner::Mail(mail_id),
            StaticAttachment::new("legal/latin1.txt").with_filename("menu.txt"),
        )
        .await?;
    service
        .add_header(AttachmentOwner::Campaign(campaign_id), "X-Campaign", "spring-sale")
        .await?;
    service
        .attach_upload(mail_id, "invoice 42.pdf", "", b"%PDF-1.4")
        .await?;

    Ok(Fixture {
        _library_dir: library_dir,
        media_dir,
        db,
        library,
        uploads,
        mail_id,
    })
}

#[tokio::test]
async fn assembles_attachments_from_both_storages() -> TestResult {
    let fixture = fixture().await?;
    let assembler = MailAssembler::new(
        Arc::new(fixture.db.clone()),
        fixture.library.clone(),
        fixture.uploads.clone(),
        Some("[Shop]".to_string()),
    );

    let assembled = assembler.assemble(fixture.mail_id).await?;

    assert_eq!(assembled.subject, "[Shop] Spring sale starts today");
    assert!(assembled.is_complete());

    let summary: Vec<_> = assembled
        .attachments
        .iter()
        .map(|attachment| {
            (
                attachment.origin,
                attachment.file_name.as_str(),
                attachment.mime_type.as_str(),
            )
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            (AttachmentOrigin::Campaign, "terms.txt", "text/plain"),
            (AttachmentOrigin::MailStatic, "menu.txt", "text/plain"),
            (AttachmentOrigin::MailDynamic, "invoice 42.pdf", "application/pdf"),
        ]
    );
    assert_eq!(
        assembled.attachments[0].content,
        AttachmentContent::Text("Be nice.".to_string())
    );
    assert_eq!(
        assembled.attachments[1].content,
        AttachmentContent::Binary(vec![b'c', b'a', b'f', 0xe9])
    );

    let message = assembled.to_message(
        "shop@example.com".parse()?,
        "alice@example.com".parse()?,
    )?;
    let formatted = String::from_utf8_lossy(&message.formatted()).to_string();

    assert!(formatted.contains("X-Campaign: spring-sale"));
    assert!(formatted.contains("invoice"));

    Ok(())
}

#[tokio::test]
async fn missing_library_file_is_reported_not_dropped() -> TestResult {
    let fixture = fixture().await?;
    tokio::fs::remove_file(fixture.library.root().join("legal/terms.txt")).await?;

    let assembler = MailAssembler::new(
        Arc::new(fixture.db.clone()),
        fixture.library.clone(),
        fixture.uploads.clone(),
        None,
    );

    let assembled = assembler.assemble(fixture.mail_id).await?;

    assert_eq!(assembled.attachments.len(), 2);
    assert_eq!(assembled.failed_attachments.len(), 1);
    assert_eq!(assembled.failed_attachments[0].reference, "legal/terms.txt");
    assert!(matches!(
        assembled.failed_attachments[0].error,
        AttachmentError::ResourceUnavailable { .. }
    ));

    Ok(())
}

#[tokio::test]
async fn deleting_a_mail_releases_its_uploads() -> TestResult {
    let fixture = fixture().await?;
    let uploaded = fixture
        .media_dir
        .path()
        .join(format!("mails/{}/invoice_42.pdf", fixture.mail_id));

    assert!(uploaded.exists());

    let service = MailServiceImpl::new(
        Arc::new(fixture.db.clone()),
        fixture.library.clone(),
        fixture.uploads.clone(),
    );

    assert_eq!(service.delete_mail(fixture.mail_id).await?, 1);
    assert!(!uploaded.exists());
    assert!(fixture
        .library
        .root()
        .join("legal/latin1.txt")
        .exists());

    Ok(())
}
