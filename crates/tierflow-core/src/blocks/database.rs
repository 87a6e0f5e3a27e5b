//! Database ブロック
//!
//! Network のサブネットに配置するリレーショナル DB インスタンスと、
//! 接続情報を保存する設定ストアのパラメータを宣言する。
//! パスワードはリテラルで渡さず、random_password の結果を参照する。

use super::{Declarations, NetworkHandle, Scope};
use crate::error::{Result, StackError};
use crate::model::{DatabaseConfig, Output, ResourceAddress, ResourceKind, Value};
use crate::validate::{Rule, Violation};

/// Database ブロックが公開するハンドル
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseHandle {
    pub instance: ResourceAddress,
    pub subnet_group: ResourceAddress,
    pub password: ResourceAddress,
    /// 設定ストアのパス（name, username, password, endpoint の順）
    pub parameter_paths: [String; 4],
}

/// Database ブロックを宣言
///
/// マルチ AZ 指定時にサブネットグループが 2 つ以上の AZ にまたがらない場合、
/// 宣言を 1 つも返さずに検証エラーとする。
pub fn database(
    scope: &Scope,
    config: &DatabaseConfig,
    network: &NetworkHandle,
) -> Result<(Declarations, DatabaseHandle)> {
    let subnets = network.subnets(config.subnet_tier);
    if subnets.is_empty() {
        return Err(StackError::InvalidConfig(format!(
            "database: {} サブネットがありません",
            config.subnet_tier
        )));
    }

    let zones = network.availability_zones(config.subnet_tier);
    if config.multi_az && zones.len() < 2 {
        return Err(StackError::Validation(vec![Violation::new(
            Rule::SubnetGroup,
            scope.name("db_subnet_group"),
            format!(
                "マルチ AZ インスタンスには 2 つ以上の AZ が必要です（{} サブネットの AZ: {}）",
                config.subnet_tier,
                zones.into_iter().collect::<Vec<_>>().join(", ")
            ),
        )]));
    }

    let prefix = config.parameter_prefix.trim_end_matches('/');
    let parameter_paths = [
        format!("{}/dbname", prefix),
        format!("{}/username", prefix),
        format!("{}/password", prefix),
        format!("{}/endpoint", prefix),
    ];

    let mut decls = Declarations::new();

    let dbname = decls.add(
        scope
            .resource(ResourceKind::SsmParameter, "dbname")
            .with("name", parameter_paths[0].as_str())
            .with("type", "String")
            .with("value", config.db_name.as_str())
            .with("overwrite", true),
    );
    let dbuser = decls.add(
        scope
            .resource(ResourceKind::SsmParameter, "dbuser")
            .with("name", parameter_paths[1].as_str())
            .with("type", "String")
            .with("value", config.username.as_str())
            .with("overwrite", true),
    );

    let password = decls.add(
        scope
            .resource(ResourceKind::RandomPassword, "dbpassword")
            .with("length", config.password.length)
            .with("special", config.password.special)
            .with("override_special", config.password.override_special.as_str()),
    );
    let password_parameter = decls.add(
        scope
            .resource(ResourceKind::SsmParameter, "dbpassword_ssm")
            .with("name", parameter_paths[2].as_str())
            .with("type", "SecureString")
            .with("value", password.attr("result")),
    );

    let subnet_group = decls.add(
        scope
            .resource(ResourceKind::DbSubnetGroup, "db_subnet_group")
            .with("name", config.subnet_group.as_str())
            .with(
                "subnet_ids",
                Value::list(subnets.iter().map(|s| s.address.attr("id"))),
            ),
    );

    let instance = decls.add(
        scope
            .resource(ResourceKind::DbInstance, "db_instance")
            .with("allocated_storage", config.allocated_storage)
            .with("engine", config.engine.as_str())
            .with("engine_version", config.engine_version.as_str())
            .with("instance_class", config.instance_class.as_str())
            .with("db_name", dbname.attr("value"))
            .with("username", dbuser.attr("value"))
            .with("password", password.attr("result"))
            .with("db_subnet_group_name", subnet_group.attr("name"))
            .with("multi_az", config.multi_az)
            .with("skip_final_snapshot", config.skip_final_snapshot)
            .with_tags([("Name", config.instance_name.as_str())]),
    );

    // エンドポイントは作成後に決まるので参照で書き込む
    let endpoint = decls.add(
        scope
            .resource(ResourceKind::SsmParameter, "dbendpoint")
            .with("name", parameter_paths[3].as_str())
            .with("type", "String")
            .with("value", instance.attr("endpoint")),
    );

    decls.output(Output::new("db_instance_identifier", instance.attr("identifier")));
    decls.output(Output::new("db_instance_endpoint", instance.attr("endpoint")));
    decls.output(Output::new("ssm_db_name", dbname.attr("name")));
    decls.output(Output::new("ssm_db_user", dbuser.attr("name")));
    decls.output(Output::new("ssm_db_password", password_parameter.attr("name")));
    decls.output(Output::new("ssm_db_endpoint", endpoint.attr("name")));

    tracing::debug!(
        subnets = subnets.len(),
        tier = %config.subnet_tier,
        "Declared database block"
    );

    Ok((
        decls,
        DatabaseHandle {
            instance,
            subnet_group,
            password,
            parameter_paths,
        },
    ))
}
