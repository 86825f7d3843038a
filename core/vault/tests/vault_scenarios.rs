//! End-to-end vault scenarios over the in-memory collaborators.

mod common;

use common::{next_event, settle, TestEnv};
use keyvault_common::{Error, KeySystemIdentifier, SensitiveBytes};
use keyvault_store::{
    DecryptedItem, ItemContent, ItemIndex, KeyPasswordType, KeyStorageMode, KeyStore, Mutator,
    VaultListing, VaultListingContent, VaultSharing,
};
use keyvault_sync::{SyncConfig, SyncMode};
use keyvault_vault::{ChangeVaultKeyOptions, LockState, VaultEvent, VaultManager, VaultManagerConfig};

async fn assert_cache_matches_key_store(manager: &VaultManager) {
    for vault in manager.vaults().await.unwrap() {
        let truth = manager.compute_vault_lock_state(&vault).await;
        assert_eq!(
            manager.is_vault_locked(&vault),
            truth.is_locked(),
            "cached state of '{}' disagrees with key store",
            vault.name()
        );
    }
}

async fn shared_listing(env: &TestEnv, name: &str) -> VaultListing {
    let id = KeySystemIdentifier::generate();
    let content = VaultListingContent {
        key_system_identifier: id.clone(),
        name: name.to_string(),
        description: None,
        key_storage_mode: KeyStorageMode::Synced,
        root_key_params: env.keys.create_root_key_params(&id, KeyPasswordType::Randomized),
        sharing: Some(VaultSharing {
            shared_vault_uuid: "shared-1".to_string(),
            owner_user_uuid: "owner-1".to_string(),
        }),
    };
    let item = env
        .mutator
        .insert_item(DecryptedItem::new(ItemContent::VaultListing(content)))
        .await
        .unwrap();
    VaultListing::try_from(&item).unwrap()
}

#[tokio::test]
async fn personal_randomized_vault_lifecycle() {
    let env = TestEnv::new().await;

    let personal = env.randomized_vault("Personal", KeyStorageMode::Local).await;
    let vaults = env.manager.vaults().await.unwrap();
    assert_eq!(vaults, vec![personal.clone()]);
    assert!(!env.manager.is_vault_locked(&personal));

    env.manager.lock_non_persistent_vault(&personal).await.unwrap();
    assert!(env.manager.is_vault_locked(&personal));

    let unlock = env
        .manager
        .unlock_non_persistent_vault(&personal, &SensitiveBytes::from("anything"))
        .await;
    assert!(matches!(unlock, Err(Error::InvalidOperation(_))));
}

#[tokio::test]
async fn locked_vaults_lists_only_locked_ones() {
    let env = TestEnv::new().await;
    let a = env.password_vault("A", "pw-a").await;
    let _b = env.password_vault("B", "pw-b").await;

    env.manager.lock_non_persistent_vault(&a).await.unwrap();

    let locked: Vec<_> = env
        .manager
        .locked_vaults()
        .await
        .unwrap()
        .iter()
        .map(|vault| vault.name().to_string())
        .collect();
    assert_eq!(locked, vec!["A"]);
}

#[tokio::test]
async fn lock_then_compute_is_locked() {
    let env = TestEnv::new().await;
    let vault = env.password_vault("Secrets", "pw").await;

    env.manager.lock_non_persistent_vault(&vault).await.unwrap();

    assert_eq!(
        env.manager.compute_vault_lock_state(&vault).await,
        LockState::Locked
    );
}

#[tokio::test]
async fn unlock_keeps_or_reverts_intake() {
    let env = TestEnv::new().await;
    let vault = env.password_vault("Secrets", "right").await;
    let id = vault.key_system_identifier();
    env.manager.lock_non_persistent_vault(&vault).await.unwrap();
    let locked_snapshot = env.keys.snapshot(id).await;

    let wrong = env
        .manager
        .unlock_non_persistent_vault(&vault, &SensitiveBytes::from("wrong"))
        .await
        .unwrap();
    assert!(!wrong);
    assert_eq!(env.keys.snapshot(id).await, locked_snapshot);

    let right = env
        .manager
        .unlock_non_persistent_vault(&vault, &SensitiveBytes::from("right"))
        .await
        .unwrap();
    assert!(right);
    let unlocked_snapshot = env.keys.snapshot(id).await;
    assert_eq!(unlocked_snapshot.non_persistent_root_keys, 1);
    assert_eq!(unlocked_snapshot.errored_items_keys, 0);
    assert!(env.keys.primary_items_key(id).await.is_some());
}

#[tokio::test]
async fn synced_vault_lock_is_rejected_without_state_change() {
    let env = TestEnv::new().await;
    let vault = env.randomized_vault("Synced", KeyStorageMode::Synced).await;
    let was_locked = env.manager.is_vault_locked(&vault);

    let result = env.manager.lock_non_persistent_vault(&vault).await;

    assert!(matches!(result, Err(Error::InvalidOperation(_))));
    assert_eq!(env.manager.is_vault_locked(&vault), was_locked);
    assert!(env.keys.primary_root_key(vault.key_system_identifier()).await.is_some());
}

#[tokio::test]
async fn moving_item_between_vaults() {
    let env = TestEnv::new().await;
    let a = env.randomized_vault("A", KeyStorageMode::Synced).await;
    let b = env.randomized_vault("B", KeyStorageMode::Synced).await;
    let note = env.note("travel plans").await;

    env.manager.add_item_to_vault(&a, &note).await.unwrap();
    let moved = env.manager.add_item_to_vault(&b, &note).await.unwrap();

    assert_eq!(env.manager.item_vault(&moved).await.unwrap(), Some(b.clone()));
    assert!(env.index.items_in_key_system(a.key_system_identifier()).await.is_empty());
    let in_b = env.index.items_in_key_system(b.key_system_identifier()).await;
    assert_eq!(in_b.len(), 1);
    assert_eq!(in_b[0].uuid, note.uuid);
}

#[tokio::test]
async fn shared_vault_delete_is_rejected_early() {
    let env = TestEnv::new().await;
    let shared = shared_listing(&env, "Team").await;
    let syncs = env.sync.calls();
    let keys_before = env.keys.snapshot(shared.key_system_identifier()).await;

    let result = env.manager.delete_vault(&shared).await;

    assert!(matches!(result, Err(Error::WrongVaultKind(_))));
    assert_eq!(env.sync.calls(), syncs);
    assert_eq!(env.keys.snapshot(shared.key_system_identifier()).await, keys_before);
    assert!(env.index.find_item(&shared.uuid).await.is_ok());
}

#[tokio::test]
async fn shared_vault_rotates_but_is_not_renamed_or_reconfigured() {
    let env = TestEnv::new().await;
    let shared = shared_listing(&env, "Team").await;
    let root = env
        .keys
        .create_randomized_root_key(shared.root_key_params().clone(), KeyStorageMode::Synced);
    env.keys.persist_root_key(root.clone()).await.unwrap();
    env.keys
        .create_items_key(&root, shared.shared_vault_uuid().map(str::to_string))
        .await
        .unwrap();
    env.manager.recompute_all_vaults_locking_state().await.unwrap();
    assert!(!env.manager.is_vault_locked(&shared));
    let syncs = env.sync.calls();

    let renamed = env
        .manager
        .change_vault_name_and_description(&shared, "Renamed", None)
        .await;
    assert!(matches!(renamed, Err(Error::WrongVaultKind(_))));
    let reconfigured = env
        .manager
        .change_vault_options(ChangeVaultKeyOptions {
            vault: shared.clone(),
            new_password_type: None,
            new_storage_mode: Some(KeyStorageMode::Local),
        })
        .await;
    assert!(matches!(reconfigured, Err(Error::WrongVaultKind(_))));
    assert_eq!(env.sync.calls(), syncs);
    assert_eq!(
        env.manager.vault_or_fail(shared.key_system_identifier()).await.unwrap(),
        shared
    );

    let rotated = env.manager.rotate_vault_root_key(&shared).await.unwrap();
    assert_ne!(rotated.root_key_params(), shared.root_key_params());
    let items_key = env
        .keys
        .primary_items_key(shared.key_system_identifier())
        .await
        .unwrap();
    assert_eq!(items_key.shared_vault_uuid.as_deref(), Some("shared-1"));
}

#[tokio::test]
async fn cache_matches_key_store_after_recompute() {
    let env = TestEnv::new().await;
    let locked = env.password_vault("Locked", "pw").await;
    let _open = env.password_vault("Open", "pw").await;
    let _synced = env.randomized_vault("Synced", KeyStorageMode::Synced).await;
    let _shared = shared_listing(&env, "Shared without keys").await;

    // Key material disappears without going through the manager.
    env.keys.clear_keys_for_vault(&locked).await.unwrap();
    env.manager.recompute_all_vaults_locking_state().await.unwrap();

    assert_cache_matches_key_store(&env.manager).await;
    assert!(env.manager.is_vault_locked(&locked));
}

#[tokio::test]
async fn observer_tracks_external_unlock() {
    let env = TestEnv::new().await;
    let vault = env.password_vault("Secrets", "pw").await;
    env.manager.lock_non_persistent_vault(&vault).await.unwrap();
    let mut events = env.manager.subscribe();

    // Another component takes the root key in directly.
    let root = env
        .keys
        .derive_user_inputted_root_key(
            vault.root_key_params(),
            &SensitiveBytes::from("pw"),
            KeyStorageMode::Local,
        )
        .await
        .unwrap();
    env.keys
        .intake_non_persistent_root_key(root, KeyStorageMode::Local)
        .await
        .unwrap();
    env.keys.decrypt_errored_payloads().await.unwrap();

    assert_eq!(next_event(&mut events).await, VaultEvent::Unlocked(vault.clone()));
    settle().await;
    assert!(!env.manager.is_vault_locked(&vault));
    assert_cache_matches_key_store(&env.manager).await;
}

#[tokio::test]
async fn new_manager_computes_existing_vaults() {
    let env = TestEnv::new().await;
    let locked = env.password_vault("Locked", "pw").await;
    let open = env.password_vault("Open", "pw").await;
    env.manager.lock_non_persistent_vault(&locked).await.unwrap();

    let restarted = VaultManager::new(
        keyvault_vault::Collaborators {
            keys: env.keys.clone(),
            index: env.index.clone(),
            mutator: env.mutator.clone(),
            files: env.files.clone(),
        },
        env.sync.clone(),
        VaultManagerConfig {
            assume_locked_until_computed: false,
            ..VaultManagerConfig::default()
        },
    )
    .await
    .unwrap();

    assert!(restarted.is_vault_locked(&locked));
    assert!(!restarted.is_vault_locked(&open));
}

#[tokio::test]
async fn every_mutation_syncs_once() {
    let env = TestEnv::new().await;
    let vault = env.randomized_vault("Work", KeyStorageMode::Synced).await;
    assert_eq!(env.sync.calls(), 1);

    let renamed = env
        .manager
        .change_vault_name_and_description(&vault, "Office", None)
        .await
        .unwrap();
    assert_eq!(env.sync.calls(), 2);

    let note = env.note("n").await;
    let in_vault = env.manager.add_item_to_vault(&renamed, &note).await.unwrap();
    assert_eq!(env.sync.calls(), 3);

    env.manager.remove_item_from_vault(&in_vault).await.unwrap();
    assert_eq!(env.sync.calls(), 4);

    env.manager.rotate_vault_root_key(&renamed).await.unwrap();
    assert_eq!(env.sync.calls(), 5);

    assert!(env.manager.delete_vault(&renamed).await.unwrap());
    assert_eq!(env.sync.calls(), 6);
}

#[tokio::test]
async fn sync_failure_surfaces_after_commit() {
    let env = TestEnv::new().await;
    let vault = env.randomized_vault("Work", KeyStorageMode::Synced).await;
    env.sync.fail_next(1);

    let result = env
        .manager
        .change_vault_name_and_description(&vault, "Office", None)
        .await;

    assert!(matches!(result, Err(Error::Network(_))));
    let stored = env.manager.vault_or_fail(vault.key_system_identifier()).await.unwrap();
    assert_eq!(stored.name(), "Office");
}

#[tokio::test]
async fn missing_vault_lookup_fails() {
    let env = TestEnv::new().await;
    let result = env.manager.vault_or_fail(&KeySystemIdentifier::generate()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn scheduler_retries_transient_push_failures() {
    let sync_config = SyncConfig {
        mode: SyncMode::Manual,
        max_retries: 3,
        initial_retry_delay_ms: 1,
        retry_jitter: false,
        ..SyncConfig::default()
    };
    let (env, scheduler) = TestEnv::scheduled(&sync_config).await;

    env.sync.fail_next(2);
    let vault = env.randomized_vault("Work", KeyStorageMode::Synced).await;
    assert_eq!(env.sync.calls(), 3);

    env.manager
        .change_vault_name_and_description(&vault, "Office", None)
        .await
        .unwrap();
    assert_eq!(env.sync.calls(), 4);

    // Out of retries: the error reaches the caller, the rename stays.
    env.sync.fail_next(4);
    let result = env
        .manager
        .change_vault_name_and_description(&vault, "Desk", None)
        .await;
    assert!(matches!(result, Err(Error::Network(_))));
    assert_eq!(env.sync.calls(), 8);
    let stored = env.manager.vault_or_fail(vault.key_system_identifier()).await.unwrap();
    assert_eq!(stored.name(), "Desk");

    scheduler.shutdown().await;
    assert!(matches!(
        env.manager.change_vault_name_and_description(&vault, "Late", None).await,
        Err(Error::Sync(_))
    ));
}
