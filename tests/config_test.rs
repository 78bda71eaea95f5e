// ==========================================
// 配置层集成测试
// ==========================================
// 测试目标: config_kv 覆写 → MatchingConfig 解析 → AppState 装配
// ==========================================

mod test_helpers;

use quota_match::app::AppState;
use quota_match::config::{config_keys, ConfigManager, MatchingConfig};
use std::time::Duration;
use test_helpers::create_test_db;

#[tokio::test]
async fn test_scenario_overrides_persist_across_managers() {
    let (_temp_file, db_path) = create_test_db().unwrap();

    let writer = ConfigManager::new(&db_path).unwrap();
    writer
        .set_global_config_value(config_keys::SAVE_BATCH_SIZE, "25")
        .unwrap();
    writer
        .set_global_config_value(config_keys::AWAIT_TIMEOUT_SECS, "90")
        .unwrap();
    writer
        .set_global_config_value(config_keys::LEARNING_INTERVAL_HOURS, " 6 ")
        .unwrap();

    let reader = ConfigManager::new(&db_path).unwrap();
    let config = MatchingConfig::load(&reader).await.unwrap();
    assert_eq!(config.save_batch_size, 25);
    assert_eq!(config.await_timeout(), Duration::from_secs(90));
    assert_eq!(config.learning_interval(), Duration::from_secs(6 * 3600), "取值前后空白应忽略");
    assert_eq!(config.matching_batch_size, 200, "未覆写项使用默认值");
}

#[tokio::test]
async fn test_scenario_out_of_range_values_normalized() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let manager = ConfigManager::new(&db_path).unwrap();
    manager
        .set_global_config_value(config_keys::POOL_SIZE, "0")
        .unwrap();
    manager
        .set_global_config_value(config_keys::LEARNING_INTERVAL_HOURS, "18446744073709551615")
        .unwrap();
    manager
        .set_global_config_value(config_keys::MATCH_THRESHOLD, "-0.2")
        .unwrap();
    manager
        .set_global_config_value(config_keys::MATCHING_BATCH_SIZE, "not-a-number")
        .unwrap();

    let config = MatchingConfig::load(&manager).await.unwrap();
    assert_eq!(config.pool_size, 1, "线程数至少为 1");
    assert_eq!(config.learning_interval(), Duration::from_secs(24 * 365 * 3600), "超大学习间隔应被截断");
    assert_eq!(config.match_threshold, 0.0);
    assert_eq!(config.matching_batch_size, 200, "格式错误回退默认值");

    let snapshot: serde_json::Value =
        serde_json::from_str(&manager.get_config_snapshot().unwrap()).unwrap();
    assert_eq!(snapshot["pool_size"], "0");
    assert_eq!(snapshot.as_object().unwrap().len(), 4);
}

#[tokio::test]
async fn test_scenario_app_state_uses_stored_config() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    ConfigManager::new(&db_path)
        .unwrap()
        .set_global_config_value(config_keys::MATCH_THRESHOLD, "0.55")
        .unwrap();

    let state = AppState::new(db_path.clone()).await.unwrap();
    assert_eq!(state.config.match_threshold, 0.55);
    assert_eq!(state.db_path, db_path);
    assert_eq!(state.learning_scheduler().period(), Duration::from_secs(24 * 3600));
    assert_eq!(state.quota_match_api.batch_match(None).unwrap(), 0, "空库批量匹配应返回 0");
    state.shutdown();
}
