// ==========================================
// QuotaMatchApi 人工操作集成测试
// ==========================================
// 测试目标: 人工单定额/单价、多定额管理与批量匹配的交互
// ==========================================

mod test_helpers;

use quota_match::domain::{MatchStatus, MatchType};
use quota_match::repository::LearningRecordRepository;
use quota_match::ApiError;
use test_helpers::{item, quota, TestEnv};

#[test]
fn test_scenario_multi_quota_sum_times_quantity() {
    let env = TestEnv::new();
    let (api, pooled) = env.api_with_learning();
    let item_id = env.insert_item(&item("视频监控系统调试", Some("系统"), 3.0));
    let q1 = env.insert_quota(&quota("系统调试", None, 10.0));
    let q2 = env.insert_quota(&quota("系统联调", None, 15.0));

    api.add_quota(item_id, q1).unwrap();
    api.add_quota(item_id, q2).unwrap();

    let saved = env.load_item(item_id);
    assert_eq!(saved.match_status, MatchStatus::ManualMulti);
    assert_eq!(saved.matched_unit_price, Some(25.0));
    assert_eq!(saved.total_price, Some(75.0), "合价应为 (10.00 + 15.00) × 3");

    let listed = api.list_quotas_for_item(item_id).unwrap();
    assert_eq!(
        listed.iter().map(|a| a.quota_id).collect::<Vec<_>>(),
        vec![q1, q2],
        "关联应按添加顺序排列"
    );
    assert_eq!(listed[1].unit_price, Some(15.0), "关联应保存定额单价快照");

    let after_remove = api.remove_quota(item_id, listed[0].id).unwrap();
    assert_eq!(after_remove.matched_unit_price, Some(15.0));
    assert_eq!(after_remove.total_price, Some(45.0));

    pooled.shutdown();
    let multi_records = LearningRecordRepository::new(env.conn.clone())
        .find_by_types(&[MatchType::ManualMulti])
        .unwrap();
    assert_eq!(multi_records.len(), 2, "每次添加定额应记录一条多定额学习数据");
}

#[test]
fn test_scenario_sort_order_appends_after_removal() {
    let env = TestEnv::new();
    let (api, _pooled) = env.api_with_learning();
    let item_id = env.insert_item(&item("视频监控系统调试", Some("系统"), 1.0));
    let q1 = env.insert_quota(&quota("系统调试", None, 10.0));
    let q2 = env.insert_quota(&quota("系统联调", None, 15.0));
    let q3 = env.insert_quota(&quota("单机调试", None, 5.0));
    let q4 = env.insert_quota(&quota("系统试运行", None, 8.0));

    api.add_quota(item_id, q1).unwrap();
    let middle = api.add_quota(item_id, q2).unwrap();
    api.add_quota(item_id, q3).unwrap();
    api.remove_quota(item_id, middle.id).unwrap();
    let appended = api.add_quota(item_id, q4).unwrap();
    assert_eq!(appended.sort_order, 3, "新关联应排在现有最大序号之后");

    let listed = api.list_quotas_for_item(item_id).unwrap();
    assert_eq!(
        listed.iter().map(|a| a.quota_id).collect::<Vec<_>>(),
        vec![q1, q3, q4],
        "移除中间关联后追加的定额应排在最后"
    );
    assert!(
        listed.windows(2).all(|w| w[0].sort_order < w[1].sort_order),
        "排序号应唯一且递增"
    );
}

#[test]
fn test_scenario_duplicate_association_rejected() {
    let env = TestEnv::new();
    let (api, _pooled) = env.api_with_learning();
    let item_id = env.insert_item(&item("系统调试", Some("系统"), 1.0));
    let quota_id = env.insert_quota(&quota("系统调试", None, 10.0));

    api.add_quota(item_id, quota_id).unwrap();
    match api.add_quota(item_id, quota_id) {
        Err(ApiError::DuplicateAssociation { item_id: i, quota_id: q }) => {
            assert_eq!((i, q), (item_id, quota_id));
        }
        other => panic!("Expected DuplicateAssociation, got {:?}", other.map(|a| a.id)),
    }
    assert_eq!(env.load_item(item_id).total_price, Some(10.0), "重复添加不应改变合价");
}

#[test]
fn test_scenario_manual_match_survives_batch_rerun() {
    let env = TestEnv::new();
    let (api, pooled) = env.api_with_learning();
    env.insert_quota(&quota("高清摄像机", None, 500.0));
    let chosen = env.insert_quota(&quota("球型摄像机", None, 1200.0));
    let item_id = env.insert_item(&item("监控摄像机", Some("台"), 2.0));

    assert_eq!(api.batch_match(None).unwrap(), 1);
    let manual = api.set_manual_match(item_id, chosen).unwrap();
    assert_eq!(manual.total_price, Some(2400.0));

    assert_eq!(api.batch_match(None).unwrap(), 0, "人工指定的条目不参与自动匹配");
    let saved = env.load_item(item_id);
    assert_eq!(saved.match_status, MatchStatus::ManualSingle);
    assert_eq!(saved.matched_quota_id, Some(chosen));
    assert_eq!(saved.total_price, Some(2400.0));

    pooled.shutdown();
    let manual_records = LearningRecordRepository::new(env.conn.clone())
        .find_by_types(&[MatchType::ManualSingle])
        .unwrap();
    assert_eq!(manual_records.len(), 1);
    assert_eq!(manual_records[0].learning_weight, 1.0, "人工修正学习权重为 1.0");
}

#[test]
fn test_scenario_manual_price_then_clear() {
    let env = TestEnv::new();
    let (api, _pooled) = env.api_with_learning();
    let item_id = env.insert_item(&item("系统调试", Some("系统"), 4.0));
    let quota_id = env.insert_quota(&quota("系统调试", None, 10.0));
    api.add_quota(item_id, quota_id).unwrap();

    let priced = api.set_manual_price(item_id, 12.5).unwrap();
    assert_eq!(priced.match_status, MatchStatus::ManualSingle);
    assert_eq!(priced.total_price, Some(50.0));
    assert!(api.list_quotas_for_item(item_id).unwrap().is_empty(), "设置单价应清除多定额关联");

    let cleared = api.clear_quotas(item_id).unwrap();
    assert_eq!(cleared.match_status, MatchStatus::Unmatched);
    assert_eq!(cleared.total_price, None);
    assert_eq!(env.load_item(item_id).matched_unit_price, None);
}

#[test]
fn test_scenario_not_found() {
    let env = TestEnv::new();
    let (api, _pooled) = env.api_with_learning();
    let item_id = env.insert_item(&item("系统调试", Some("系统"), 1.0));
    let other_item = env.insert_item(&item("系统联调", Some("系统"), 1.0));
    let quota_id = env.insert_quota(&quota("系统调试", None, 10.0));
    let assoc = api.add_quota(other_item, quota_id).unwrap();

    assert!(matches!(api.set_manual_match(9999, quota_id), Err(ApiError::NotFound(_))));
    assert!(matches!(api.set_manual_match(item_id, 9999), Err(ApiError::NotFound(_))));
    assert!(matches!(api.set_manual_price(9999, 1.0), Err(ApiError::NotFound(_))));
    assert!(
        matches!(api.remove_quota(item_id, assoc.id), Err(ApiError::NotFound(_))),
        "不能移除属于其他条目的关联"
    );
    assert_eq!(api.list_quotas_for_item(other_item).unwrap().len(), 1);
}
