// ==========================================
// 定额匹配系统 - 定额画像缓存
// ==========================================
// 每次批量匹配构建一次: 预提取全部定额的名称/特征/关键词
// 构建完成后只读，可在工作线程间无锁共享
// 扫描顺序固定为定额 id 升序
// ==========================================

use crate::domain::quota::EnterpriseQuota;
use crate::engine::keyword_extractor::KeywordExtractor;
use crate::engine::similarity::{MatchProfile, ProfileView, TextProfile};
use std::collections::HashMap;

pub struct MatchCache {
    quotas: Vec<EnterpriseQuota>,
    keywords: HashMap<i64, Vec<String>>,
    names: HashMap<i64, TextProfile>,
    features: HashMap<i64, TextProfile>,
}

/// 扫描时的单个定额视图
pub struct CachedQuota<'a> {
    pub quota: &'a EnterpriseQuota,
    pub profile: ProfileView<'a>,
}

impl MatchCache {
    pub fn build(mut quotas: Vec<EnterpriseQuota>, extractor: &KeywordExtractor) -> Self {
        quotas.sort_by_key(|q| q.id);

        let mut keywords = HashMap::with_capacity(quotas.len());
        let mut names = HashMap::with_capacity(quotas.len());
        let mut features = HashMap::with_capacity(quotas.len());

        for quota in &quotas {
            let profile = MatchProfile::build(
                extractor,
                quota.quota_name.as_deref(),
                quota.feature_value.as_deref(),
            );
            if let Some(name) = profile.name {
                names.insert(quota.id, name);
            }
            if let Some(feature) = profile.feature {
                features.insert(quota.id, feature);
            }
            keywords.insert(quota.id, profile.keywords);
        }

        Self {
            quotas,
            keywords,
            names,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.quotas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }

    pub fn keywords(&self, quota_id: i64) -> &[String] {
        self.keywords.get(&quota_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn name(&self, quota_id: i64) -> Option<&TextProfile> {
        self.names.get(&quota_id)
    }

    pub fn feature(&self, quota_id: i64) -> Option<&TextProfile> {
        self.features.get(&quota_id)
    }

    /// 按 id 升序遍历
    pub fn iter(&self) -> impl Iterator<Item = CachedQuota<'_>> {
        self.quotas.iter().map(move |quota| CachedQuota {
            quota,
            profile: ProfileView {
                name: self.name(quota.id),
                feature: self.feature(quota.id),
                keywords: self.keywords(quota.id),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lexicon::Lexicon;

    fn quota(id: i64, name: &str, feature: Option<&str>) -> EnterpriseQuota {
        EnterpriseQuota {
            id,
            quota_name: Some(name.to_string()),
            feature_value: feature.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_orders_by_id_and_indexes_profiles() {
        let extractor = KeywordExtractor::new(Lexicon::standard());
        let cache = MatchCache::build(
            vec![
                quota(3, "网络硬盘录像机", Some("16路")),
                quota(1, "高清摄像机", None),
                quota(2, "  ", None),
            ],
            &extractor,
        );

        assert_eq!(cache.len(), 3);
        let ids: Vec<i64> = cache.iter().map(|c| c.quota.id).collect();
        assert_eq!(ids, vec![1, 2, 3], "扫描顺序应为 id 升序");

        assert!(cache.name(1).is_some());
        assert!(cache.name(2).is_none(), "空白名称不应进入名称缓存");
        assert!(cache.feature(3).is_some());
        assert!(cache.keywords(2).is_empty());
        assert!(cache.keywords(3).contains(&"硬盘录像机".to_string()));
        assert!(cache.keywords(404).is_empty());
    }
}
