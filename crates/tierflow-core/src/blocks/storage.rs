//! Storage ブロック
//!
//! バケット、ライフサイクルルール、キュー、イベント通知、キューのアクセスポリシーを
//! 1 つの単位として宣言する。通知とポリシーは同じバケット ARN / キュー ARN の組を参照する。

use super::{Declarations, Scope};
use crate::error::{Result, StackError};
use crate::model::{Output, ResourceAddress, ResourceKind, StorageConfig, Value};
use crate::validate::{Rule, Violation};

/// Storage ブロックが公開するハンドル
#[derive(Debug, Clone, PartialEq)]
pub struct StorageHandle {
    pub bucket: ResourceAddress,
    pub queue: ResourceAddress,
    pub lifecycle: ResourceAddress,
    pub notification: ResourceAddress,
    pub queue_policy: ResourceAddress,
}

/// Storage ブロックを宣言
pub fn storage(scope: &Scope, config: &StorageConfig) -> Result<(Declarations, StorageHandle)> {
    if config.transition_days >= config.expiration_days {
        return Err(StackError::Validation(vec![Violation::new(
            Rule::Lifecycle,
            scope.name("bucket_lifecycle"),
            format!(
                "移行日数 ({}) は失効日数 ({}) より小さくなければなりません",
                config.transition_days, config.expiration_days
            ),
        )]));
    }
    if config.events.is_empty() {
        return Err(StackError::InvalidConfig(
            "storage: 通知するイベントが指定されていません".to_string(),
        ));
    }

    let mut decls = Declarations::new();

    let bucket = decls.add(
        scope
            .resource(ResourceKind::S3Bucket, "bucket")
            .with("bucket", config.bucket.as_str()),
    );

    let lifecycle = decls.add(
        scope
            .resource(ResourceKind::S3BucketLifecycleConfiguration, "bucket_lifecycle")
            .with("bucket", bucket.attr("bucket"))
            .with(
                "rule",
                Value::list([Value::map([
                    ("id", Value::from(config.rule_id.as_str())),
                    ("status", Value::from("Enabled")),
                    (
                        "filter",
                        Value::map([("prefix", config.prefix.as_str())]),
                    ),
                    (
                        "transition",
                        Value::list([Value::map([
                            ("days", Value::from(config.transition_days)),
                            ("storage_class", Value::from(config.storage_class.as_str())),
                        ])]),
                    ),
                    (
                        "expiration",
                        Value::map([("days", config.expiration_days)]),
                    ),
                ])]),
            ),
    );

    let queue = decls.add(
        scope
            .resource(ResourceKind::SqsQueue, "queue")
            .with("name", config.queue.as_str()),
    );

    // 送信元バケットの ARN で条件を絞る（条件なしのポリシーは宣言しない）
    let queue_policy = decls.add(
        scope
            .resource(ResourceKind::SqsQueuePolicy, "queue_policy")
            .with("queue_url", queue.attr("url"))
            .with(
                "policy",
                Value::json(Value::map([
                    ("Version", Value::from("2012-10-17")),
                    (
                        "Statement",
                        Value::list([Value::map([
                            ("Effect", Value::from("Allow")),
                            ("Principal", Value::from("*")),
                            ("Action", Value::from("sqs:SendMessage")),
                            ("Resource", Value::from(queue.attr("arn"))),
                            (
                                "Condition",
                                Value::map([(
                                    "ArnEquals",
                                    Value::map([("aws:SourceArn", bucket.attr("arn"))]),
                                )]),
                            ),
                        ])]),
                    ),
                ])),
            ),
    );

    // バケットは通知先への送信権限を確認するため、ポリシーの後に通知を設定する
    let notification = decls.add(
        scope
            .resource(ResourceKind::S3BucketNotification, "bucket_notification")
            .with("bucket", bucket.attr("id"))
            .with(
                "queue",
                Value::list([Value::map([
                    ("queue_arn", Value::from(queue.attr("arn"))),
                    ("events", Value::list(config.events.iter())),
                    ("filter_prefix", Value::from(config.prefix.as_str())),
                ])]),
            )
            .depends_on(&queue_policy),
    );

    decls.output(Output::new("s3_bucket_name", bucket.attr("bucket")));
    decls.output(Output::new("s3_bucket_arn", bucket.attr("arn")));
    decls.output(Output::new("sqs_queue_url", queue.attr("url")));
    decls.output(Output::new("sqs_queue_arn", queue.attr("arn")));

    Ok((
        decls,
        StorageHandle {
            bucket,
            queue,
            lifecycle,
            notification,
            queue_policy,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(config: &StorageConfig) -> Result<(Declarations, StorageHandle)> {
        storage(&Scope::new("storage"), config)
    }

    #[test]
    fn test_storage_declarations() {
        let (decls, _) = build(&StorageConfig::default()).unwrap();
        assert_eq!(decls.resources.len(), 5);
        assert_eq!(decls.outputs.len(), 4);
    }

    #[test]
    fn test_lifecycle_rule() {
        let (decls, handle) = build(&StorageConfig::default()).unwrap();
        let lifecycle = decls.find(&handle.lifecycle).unwrap();
        let rule = &lifecycle.get("rule").and_then(Value::as_list).unwrap()[0];
        assert_eq!(
            rule.get("filter").and_then(|f| f.get("prefix")).and_then(Value::as_str),
            Some("proofOfPayment/")
        );
        let transition = &rule.get("transition").and_then(Value::as_list).unwrap()[0];
        assert_eq!(transition.get("days"), Some(&Value::Int(180)));
        assert_eq!(
            rule.get("expiration").and_then(|e| e.get("days")),
            Some(&Value::Int(365))
        );
    }

    #[test]
    fn test_policy_scoped_to_bucket_arn() {
        let (decls, handle) = build(&StorageConfig::default()).unwrap();
        let policy = decls.find(&handle.queue_policy).unwrap();
        let statement = &policy
            .get("policy")
            .and_then(|p| p.get("Statement"))
            .and_then(Value::as_list)
            .unwrap()[0];
        let source = statement
            .get("Condition")
            .and_then(|c| c.get("ArnEquals"))
            .and_then(|c| c.get("aws:SourceArn"))
            .and_then(Value::as_reference)
            .unwrap();
        assert_eq!(source, &handle.bucket.attr("arn"));
    }

    #[test]
    fn test_notification_after_policy() {
        let (decls, handle) = build(&StorageConfig::default()).unwrap();
        let notification = decls.find(&handle.notification).unwrap();
        assert_eq!(notification.depends_on, vec![handle.queue_policy.clone()]);

        let target = &notification.get("queue").and_then(Value::as_list).unwrap()[0];
        assert_eq!(
            target.get("queue_arn").and_then(Value::as_reference),
            Some(&handle.queue.attr("arn"))
        );
        assert_eq!(
            target.get("filter_prefix").and_then(Value::as_str),
            Some("proofOfPayment/")
        );
    }

    #[test]
    fn test_contradictory_lifecycle_rejected() {
        let config = StorageConfig {
            transition_days: 365,
            expiration_days: 365,
            ..Default::default()
        };
        assert!(matches!(build(&config), Err(StackError::Validation(_))));
    }

    #[test]
    fn test_bucket_name_parameterized() {
        let config = StorageConfig {
            bucket: "my-bucket".to_string(),
            ..Default::default()
        };
        let (decls, handle) = build(&config).unwrap();
        let bucket = decls.find(&handle.bucket).unwrap();
        assert_eq!(bucket.get("bucket").and_then(Value::as_str), Some("my-bucket"));
    }
}
