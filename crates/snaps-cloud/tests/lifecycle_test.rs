//! Creator lifecycle against the in-memory cloud: idempotent create,
//! repeatable clean and session release.

mod common;

use common::{CapturedLogs, TestCloud, flavor};
use snaps_cloud::{
    CloudError, CloudObject, CreatorState, FlavorCreator, ImageCreator, KeypairCreator,
    NetworkCreator, ProjectCreator, QosCreator, SecurityGroupCreator, UserCreator, VolumeCreator,
    VolumeTypeCreator,
};
use snaps_core::{
    KeypairConfig, NetworkConfig, ProjectConfig, QosConfig, ResourceKind, SecurityGroupConfig,
    UserConfig, VolumeConfig, VolumeTypeConfig,
};
use std::time::Duration;

#[tokio::test]
async fn test_flavor_create_is_idempotent() {
    let env = TestCloud::new();
    let mut first = FlavorCreator::new(env.connector(), env.admin.clone(), flavor("m1.test"));
    let created = first.create().await.unwrap();
    assert_eq!(first.state(), CreatorState::Bound);

    let mut second = FlavorCreator::new(env.connector(), env.admin.clone(), flavor("m1.test"));
    let found = second.create().await.unwrap();
    assert_eq!(created.id(), found.id());
    assert_eq!(env.cloud.count(ResourceKind::Flavor, "m1.test"), 1);

    first.clean().await.unwrap();
    second.clean().await.unwrap();
    assert_eq!(env.cloud.count(ResourceKind::Flavor, "m1.test"), 0);
}

#[tokio::test]
async fn test_initialize_never_creates() {
    let env = TestCloud::new();
    let mut creator = FlavorCreator::new(env.connector(), env.admin.clone(), flavor("m1.absent"));
    assert!(creator.initialize().await.unwrap().is_none());
    assert_eq!(creator.state(), CreatorState::BoundOrAbsent);
    assert_eq!(env.cloud.count(ResourceKind::Flavor, "m1.absent"), 0);
    creator.clean().await.unwrap();
}

#[tokio::test]
async fn test_clean_twice_and_session_release() {
    let env = TestCloud::new();
    let mut creator = FlavorCreator::new(env.connector(), env.admin.clone(), flavor("m1.clean"));

    // Never initialized: nothing to do.
    creator.clean().await.unwrap();

    creator.create().await.unwrap();
    assert_eq!(env.cloud.open_sessions(), 1);

    creator.clean().await.unwrap();
    assert_eq!(creator.state(), CreatorState::Uninitialized);
    assert_eq!(env.cloud.open_sessions(), 0);

    creator.clean().await.unwrap();
    assert!(creator.flavor().is_none());
}

#[tokio::test]
async fn test_bad_credentials_fail_on_initialize() {
    let env = TestCloud::new();
    let mut creds = env.admin.clone();
    creds.password = "wrong".to_string();
    let mut creator = FlavorCreator::new(env.connector(), creds, flavor("m1.denied"));
    let err = creator.initialize().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(creator.state(), CreatorState::Uninitialized);
}

#[tokio::test]
async fn test_injected_failure_is_a_creation_error() {
    let env = TestCloud::new();
    env.cloud.fail_on(ResourceKind::Flavor, "m1.broken");
    let mut creator = FlavorCreator::new(env.connector(), env.admin.clone(), flavor("m1.broken"));
    let err = creator.create().await.unwrap_err();
    let CloudError::Creation { kind, name, .. } = &err else {
        panic!("expected a creation error, got {err}");
    };
    assert_eq!(*kind, ResourceKind::Flavor);
    assert_eq!(name, "m1.broken");
    creator.clean().await.unwrap();
    assert_eq!(env.cloud.open_sessions(), 0);
}

#[tokio::test]
async fn test_project_user_and_delegated_session() {
    let env = TestCloud::new();
    let mut project = ProjectCreator::new(
        env.connector(),
        env.admin.clone(),
        ProjectConfig {
            name: "tenant-a".to_string(),
            ..Default::default()
        },
    );
    project.create().await.unwrap();

    let mut user = UserCreator::new(
        env.connector(),
        env.admin.clone(),
        UserConfig {
            name: "alice".to_string(),
            password: "secret".to_string(),
            project_name: Some("tenant-a".to_string()),
            roles: [("member".to_string(), "tenant-a".to_string())].into(),
            ..Default::default()
        },
    );
    user.create().await.unwrap();

    let creds = user.user_creds("tenant-a");
    assert_eq!(creds.username, "alice");
    assert_eq!(creds.project_name, "tenant-a");
    assert_eq!(creds.auth_url, env.admin.auth_url);

    let mut group = SecurityGroupCreator::new(
        env.connector(),
        creds,
        SecurityGroupConfig::new("tenant-sg"),
    );
    let realized = group.create().await.unwrap();
    assert_eq!(realized.kind(), ResourceKind::SecurityGroup);

    // The project still owns the group, so it cannot go first.
    let mut early = ProjectCreator::new(
        env.connector(),
        env.admin.clone(),
        ProjectConfig {
            name: "tenant-a".to_string(),
            ..Default::default()
        },
    );
    early.initialize().await.unwrap();
    assert!(early.clean().await.unwrap_err().is_conflict());

    group.clean().await.unwrap();
    user.clean().await.unwrap();
    project.clean().await.unwrap();
    assert_eq!(env.cloud.count(ResourceKind::Project, "tenant-a"), 0);
    assert_eq!(env.cloud.count(ResourceKind::User, "alice"), 0);
    assert_eq!(env.cloud.open_sessions(), 0);
}

#[tokio::test]
async fn test_member_lookup_in_foreign_project_reads_as_absent() {
    let env = TestCloud::new();
    let member = env.cloud.add_member("bob", "pw", "tenant-b");
    let mut creator = SecurityGroupCreator::new(
        env.connector(),
        member,
        SecurityGroupConfig {
            name: "admin-sg".to_string(),
            project_name: Some("admin".to_string()),
            ..Default::default()
        },
    );
    assert!(creator.initialize().await.unwrap().is_none());
    assert_eq!(creator.state(), CreatorState::BoundOrAbsent);
    creator.clean().await.unwrap();
}

#[tokio::test]
async fn test_member_network_lookup_in_foreign_project_warns() {
    let env = TestCloud::new();
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let member = env.cloud.add_member("carol", "pw", "tenant-c");
    let mut creator = NetworkCreator::new(
        env.connector(),
        member,
        NetworkConfig {
            project_name: Some("admin".to_string()),
            ..NetworkConfig::new("admin-net")
        },
    );
    assert!(creator.initialize().await.unwrap().is_none());
    assert_eq!(creator.state(), CreatorState::BoundOrAbsent);
    creator.clean().await.unwrap();
    assert_eq!(env.cloud.open_sessions(), 0);

    let output = logs.contents();
    let line = output
        .lines()
        .find(|l| l.contains("Lookup not authorized"))
        .unwrap_or_else(|| panic!("no lookup warning in:\n{}", output));
    assert!(line.contains("WARN"), "{}", line);
    assert!(line.contains("kind=Network"), "{}", line);
    assert!(line.contains("admin-net"), "{}", line);
}

#[tokio::test]
async fn test_keypair_generation_writes_and_removes_files() {
    let env = TestCloud::new();
    let public = env.dir.path().join("keys/kp.pub");
    let private = env.dir.path().join("keys/kp");
    let config = KeypairConfig {
        name: "kp".to_string(),
        public_filepath: Some(public.clone()),
        private_filepath: Some(private.clone()),
        ..Default::default()
    };
    let mut creator = KeypairCreator::new(env.connector(), env.admin.clone(), config);
    creator.create().await.unwrap();

    let public_key = std::fs::read_to_string(&public).unwrap();
    assert_eq!(public_key, creator.keypair().unwrap().public_key);
    assert!(std::fs::read_to_string(&private).unwrap().contains("PRIVATE KEY"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&private).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    creator.clean().await.unwrap();
    assert!(!public.exists());
    assert!(!private.exists());
    assert_eq!(env.cloud.count(ResourceKind::Keypair, "kp"), 0);
}

#[tokio::test]
async fn test_keypair_imports_existing_public_key() {
    let env = TestCloud::new();
    let public = env.dir.path().join("existing.pub");
    std::fs::write(&public, "ssh-rsa AAAAB3Nza existing\n").unwrap();
    let config = KeypairConfig {
        name: "imported".to_string(),
        public_filepath: Some(public.clone()),
        ..Default::default()
    };
    let mut creator = KeypairCreator::new(env.connector(), env.admin.clone(), config);
    creator.create().await.unwrap();
    assert_eq!(creator.keypair().unwrap().public_key, "ssh-rsa AAAAB3Nza existing");

    // Files the creator did not write are left alone.
    creator.clean().await.unwrap();
    assert!(public.exists());
}

#[tokio::test]
async fn test_image_from_file() {
    let env = TestCloud::new();
    let mut creator = ImageCreator::new(env.connector(), env.admin.clone(), env.image_config("cirros"));
    let realized = creator.create().await.unwrap();
    assert_eq!(realized.kind(), ResourceKind::Image);
    assert!(creator.image().unwrap().is_active());
    assert!(creator.image_active(false).await.unwrap());

    creator.clean().await.unwrap();
    assert_eq!(env.cloud.count(ResourceKind::Image, "cirros"), 0);
}

#[tokio::test]
async fn test_image_marked_existing_is_never_uploaded_or_deleted() {
    let env = TestCloud::new();
    let mut config = env.image_config("external");
    config.exists = true;
    let mut missing = ImageCreator::new(env.connector(), env.admin.clone(), config.clone());
    assert!(matches!(
        missing.create().await.unwrap_err(),
        CloudError::Creation { .. }
    ));
    missing.clean().await.unwrap();

    let mut uploader = ImageCreator::new(env.connector(), env.admin.clone(), env.image_config("external"));
    uploader.create().await.unwrap();

    let mut existing = ImageCreator::new(env.connector(), env.admin.clone(), config);
    existing.create().await.unwrap();
    existing.clean().await.unwrap();
    assert_eq!(env.cloud.count(ResourceKind::Image, "external"), 1);

    uploader.clean().await.unwrap();
}

#[tokio::test]
async fn test_volume_type_with_qos_and_volume() {
    let env = TestCloud::new();
    let mut qos = QosCreator::new(
        env.connector(),
        env.admin.clone(),
        QosConfig {
            name: "gold".to_string(),
            specs: [("total_iops_sec".to_string(), "500".to_string())].into(),
            ..Default::default()
        },
    );
    let spec = qos.create().await.unwrap();

    let mut volume_type = VolumeTypeCreator::new(
        env.connector(),
        env.admin.clone(),
        VolumeTypeConfig {
            name: "fast".to_string(),
            qos_spec_name: Some("gold".to_string()),
            ..Default::default()
        },
    );
    volume_type.create().await.unwrap();
    assert_eq!(
        volume_type.volume_type().unwrap().qos_spec_id.as_deref(),
        Some(spec.id())
    );

    let mut volume_config = VolumeConfig::new("data", 1);
    volume_config.type_name = Some("fast".to_string());
    let mut volume = VolumeCreator::new(env.connector(), env.admin.clone(), volume_config)
        .with_poll_interval(Duration::from_millis(1));
    volume.create().await.unwrap();
    assert!(volume.volume().unwrap().is_available());

    // Types in use and associated specs refuse deletion.
    let mut early = VolumeTypeCreator::new(
        env.connector(),
        env.admin.clone(),
        VolumeTypeConfig {
            name: "fast".to_string(),
            ..Default::default()
        },
    );
    early.initialize().await.unwrap();
    assert!(early.clean().await.unwrap_err().is_conflict());

    volume.clean().await.unwrap();
    volume_type.clean().await.unwrap();
    qos.clean().await.unwrap();
    assert_eq!(env.cloud.count(ResourceKind::Volume, "data"), 0);
    assert_eq!(env.cloud.count(ResourceKind::VolumeType, "fast"), 0);
    assert_eq!(env.cloud.count(ResourceKind::QosSpec, "gold"), 0);
    assert_eq!(env.cloud.open_sessions(), 0);
}

#[tokio::test]
async fn test_volume_waits_through_creating() {
    let env = TestCloud::new();
    env.cloud.set_volume_polls(3);
    let mut volume = VolumeCreator::new(env.connector(), env.admin.clone(), VolumeConfig::new("slow", 2))
        .with_poll_interval(Duration::from_millis(1));
    volume.create().await.unwrap();
    assert_eq!(volume.volume().unwrap().status, "available");
    volume.clean().await.unwrap();
}
