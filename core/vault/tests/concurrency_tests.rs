//! Interleaved lock, unlock and recompute sequences.
//!
//! Whatever order the tasks run in, once they finish and the observer has
//! caught up, every cached lock state must match the key store.

mod common;

use std::sync::Arc;

use common::{settle, TestEnv};
use keyvault_common::SensitiveBytes;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lock_unlock_keeps_cache_consistent() {
    let env = Arc::new(TestEnv::new().await);
    let mut vaults = Vec::new();
    for i in 0..4 {
        vaults.push(env.password_vault(&format!("vault-{i}"), &format!("pw-{i}")).await);
    }

    let mut tasks = JoinSet::new();
    for (i, vault) in vaults.iter().cloned().enumerate() {
        let env = env.clone();
        tasks.spawn(async move {
            let password = SensitiveBytes::from(format!("pw-{i}").as_str());
            for _ in 0..5 {
                env.manager.lock_non_persistent_vault(&vault).await.unwrap();
                assert!(env
                    .manager
                    .unlock_non_persistent_vault(&vault, &password)
                    .await
                    .unwrap());
            }
            if i % 2 == 0 {
                env.manager.lock_non_persistent_vault(&vault).await.unwrap();
            }
        });
    }
    for _ in 0..3 {
        let env = env.clone();
        tasks.spawn(async move {
            for _ in 0..5 {
                env.manager.recompute_all_vaults_locking_state().await.unwrap();
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    settle().await;
    env.manager.recompute_all_vaults_locking_state().await.unwrap();

    for (i, vault) in vaults.iter().enumerate() {
        let truth = env.manager.compute_vault_lock_state(vault).await;
        assert_eq!(truth.is_locked(), i % 2 == 0);
        assert_eq!(env.manager.is_vault_locked(vault), truth.is_locked());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wrong_passwords_leave_key_store_untouched() {
    let env = Arc::new(TestEnv::new().await);
    let vault = env.password_vault("Secrets", "right").await;
    env.manager.lock_non_persistent_vault(&vault).await.unwrap();
    let before = env.keys.snapshot(vault.key_system_identifier()).await;

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let env = env.clone();
        let vault = vault.clone();
        tasks.spawn(async move {
            let password = SensitiveBytes::from(format!("wrong-{i}").as_str());
            env.manager
                .unlock_non_persistent_vault(&vault, &password)
                .await
                .unwrap()
        });
    }
    while let Some(result) = tasks.join_next().await {
        assert!(!result.unwrap());
    }

    assert_eq!(env.keys.snapshot(vault.key_system_identifier()).await, before);
    assert!(env.manager.is_vault_locked(&vault));
}
