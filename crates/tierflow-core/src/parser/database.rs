//! database ノードのパース

use super::{bool_arg, required_string, u32_arg};
use crate::error::{Result, StackError};
use crate::model::{DatabaseConfig, PasswordPolicy, SubnetTier};
use kdl::KdlNode;

/// database ノードをパース
pub fn parse_database(node: &KdlNode, mut db: DatabaseConfig) -> Result<DatabaseConfig> {
    let Some(children) = node.children() else {
        return Ok(db);
    };

    for child in children.nodes() {
        match child.name().value() {
            "engine" => db.engine = required_string(child, "database.engine")?,
            "engine-version" | "engine_version" => {
                db.engine_version = required_string(child, "database.engine-version")?;
            }
            "instance-class" | "instance_class" => {
                db.instance_class = required_string(child, "database.instance-class")?;
            }
            "allocated-storage" | "allocated_storage" => {
                db.allocated_storage = u32_arg(child, "database.allocated-storage")?;
            }
            "name" | "db-name" | "db_name" => db.db_name = required_string(child, "database.name")?,
            "username" => db.username = required_string(child, "database.username")?,
            "parameter-prefix" | "parameter_prefix" => {
                db.parameter_prefix = required_string(child, "database.parameter-prefix")?;
            }
            "subnet-group" | "subnet_group" => {
                db.subnet_group = required_string(child, "database.subnet-group")?;
            }
            "subnet-tier" | "subnet_tier" => {
                db.subnet_tier = match required_string(child, "database.subnet-tier")?.as_str() {
                    "public" => SubnetTier::Public,
                    "private" => SubnetTier::Private,
                    other => {
                        return Err(StackError::InvalidConfig(format!(
                            "database.subnet-tier: public か private を指定してください ({})",
                            other
                        )));
                    }
                };
            }
            "multi-az" | "multi_az" => db.multi_az = bool_arg(child, "database.multi-az")?,
            "skip-final-snapshot" | "skip_final_snapshot" => {
                db.skip_final_snapshot = bool_arg(child, "database.skip-final-snapshot")?;
            }
            "instance-name" | "instance_name" => {
                db.instance_name = required_string(child, "database.instance-name")?;
            }
            "password" => db.password = parse_password(child, db.password)?,
            _ => {}
        }
    }

    Ok(db)
}

/// password { length 16; special #true; override-special "_!%@" }
fn parse_password(node: &KdlNode, mut policy: PasswordPolicy) -> Result<PasswordPolicy> {
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "length" => policy.length = u32_arg(child, "database.password.length")?,
                "special" => policy.special = bool_arg(child, "database.password.special")?,
                "override-special" | "override_special" => {
                    policy.override_special =
                        required_string(child, "database.password.override-special")?;
                }
                _ => {}
            }
        }
    }

    if policy.length == 0 {
        return Err(StackError::InvalidConfig(
            "database.password.length: 1 以上を指定してください".to_string(),
        ));
    }
    Ok(policy)
}
