// ABOUTME: Infrastructure-as-code generation for a decided shape.
// ABOUTME: TerraformTemplates renders main.tf per shape plus a tfvars file of parameters.

use serde_json::{Value, json};
use std::path::Path;

use super::error::ProvisionError;
use crate::decision::{InfrastructureDecision, Runtime, Shape, SizeTier};
use crate::types::{AppName, JobId};

pub const MAIN_FILE: &str = "main.tf";
pub const VARS_FILE: &str = "terraform.tfvars.json";

/// Inputs that are not part of the decision itself.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub job: JobId,
    pub app: AppName,
    /// EC2 key pair for SSH access to host shapes.
    pub key_name: Option<String>,
    /// Function handler, e.g. `app.handler`.
    pub handler: Option<String>,
}

/// A template body plus the variables it is applied with.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTemplate {
    /// Stable identifier of the template body, recorded on the environment.
    pub id: String,
    pub main_tf: String,
    pub variables: Value,
}

impl RenderedTemplate {
    pub fn write_to(&self, workdir: &Path) -> Result<(), ProvisionError> {
        let main = workdir.join(MAIN_FILE);
        std::fs::write(&main, &self.main_tf)
            .map_err(|source| ProvisionError::Workdir { path: main, source })?;

        let vars = workdir.join(VARS_FILE);
        let body = serde_json::to_string_pretty(&self.variables).map_err(|e| {
            ProvisionError::Template {
                message: e.to_string(),
            }
        })?;
        std::fs::write(&vars, body).map_err(|source| ProvisionError::Workdir { path: vars, source })
    }
}

pub trait TemplateGenerator: Send + Sync {
    fn render(
        &self,
        decision: &InfrastructureDecision,
        ctx: &TemplateContext,
    ) -> Result<RenderedTemplate, ProvisionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformTemplates;

impl TemplateGenerator for TerraformTemplates {
    fn render(
        &self,
        decision: &InfrastructureDecision,
        ctx: &TemplateContext,
    ) -> Result<RenderedTemplate, ProvisionError> {
        let params = &decision.params;
        let mut blocks = vec![PROVIDER];
        let mut id = vec![format!("aws-{}", decision.shape)];

        let mut variables = json!({
            "region": params.region,
            "app_name": ctx.app.as_str(),
            "job_id": ctx.job.to_string(),
            "ports": params.ports,
        });

        match decision.shape {
            Shape::VirtualMachine | Shape::Container => {
                let SizeTier::Instance { instance_type } = &params.size else {
                    return Err(ProvisionError::Template {
                        message: format!("{} needs an instance size", decision.shape),
                    });
                };
                variables["instance_type"] = json!(instance_type);
                variables["key_name"] = json!(ctx.key_name);
                variables["user_data"] = json!(bootstrap_script(decision.shape, params.runtime));
                blocks.push(HOST);
            }
            Shape::Serverless => {
                let SizeTier::Function { memory_mb } = params.size else {
                    return Err(ProvisionError::Template {
                        message: "serverless needs a function memory size".to_string(),
                    });
                };
                if params.runtime == Runtime::Custom {
                    return Err(ProvisionError::Template {
                        message: "serverless needs a python or node runtime".to_string(),
                    });
                }
                variables["runtime"] = json!(params.runtime.as_str());
                variables["memory_mb"] = json!(memory_mb);
                variables["handler"] = json!(
                    ctx.handler
                        .clone()
                        .unwrap_or_else(|| default_handler(params.runtime))
                );
                blocks.push(FUNCTION);
            }
        }

        if let Some(service) = params.database.as_deref() {
            let (engine, scheme, port) = match service {
                "rds-postgres" => ("postgres", "postgresql", 5432),
                "rds-mysql" => ("mysql", "mysql", 3306),
                other => {
                    return Err(ProvisionError::Template {
                        message: format!("no template for database service {other}"),
                    });
                }
            };
            variables["db_engine"] = json!(engine);
            variables["db_scheme"] = json!(scheme);
            variables["db_port"] = json!(port);
            variables["db_password"] = json!(uuid::Uuid::new_v4().simple().to_string());
            blocks.push(DATABASE_VARS);
            blocks.push(if decision.shape.is_host() {
                DATABASE_FOR_HOST
            } else {
                DATABASE
            });
            blocks.push(DATABASE_OUTPUTS);
            id.push(engine.to_string());
        }

        if params.cache.as_deref() == Some("elasticache-redis") {
            blocks.push(CACHE);
            id.push("redis".to_string());
        }

        if params.queue.as_deref() == Some("sqs") {
            blocks.push(QUEUE);
            id.push("sqs".to_string());
        }

        Ok(RenderedTemplate {
            id: id.join("+"),
            main_tf: blocks.join("\n"),
            variables,
        })
    }
}

fn default_handler(runtime: Runtime) -> String {
    match runtime {
        Runtime::Nodejs18 => "index.handler".to_string(),
        _ => "app.handler".to_string(),
    }
}

/// First-boot script for host shapes.
fn bootstrap_script(shape: Shape, runtime: Runtime) -> String {
    let mut script = String::from("#!/bin/bash\nset -e\ndnf -y update || true\n");
    match shape {
        Shape::Container => {
            script.push_str("dnf -y install docker\nsystemctl enable --now docker\n");
            script.push_str("usermod -aG docker ec2-user\n");
        }
        _ => match runtime {
            Runtime::Nodejs18 => script.push_str("dnf -y install nodejs npm\n"),
            _ => script.push_str("dnf -y install python3 python3-pip\n"),
        },
    }
    script.push_str("touch /var/lib/cloud/autodeploy-ready\n");
    script
}

const PROVIDER: &str = r#"terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
}

provider "aws" {
  region = var.region
  default_tags {
    tags = {
      "autodeploy:app" = var.app_name
      "autodeploy:job" = var.job_id
    }
  }
}

variable "region" { type = string }
variable "app_name" { type = string }
variable "job_id" { type = string }
variable "ports" { type = list(number) }
"#;

// App ports are opened after start by the firewall step, only SSH here.
const HOST: &str = r#"variable "instance_type" { type = string }
variable "user_data" { type = string }
variable "key_name" {
  type    = string
  default = null
}

data "aws_ami" "linux" {
  most_recent = true
  owners      = ["amazon"]
  filter {
    name   = "name"
    values = ["al2023-ami-2023.*-x86_64"]
  }
}

resource "aws_security_group" "app" {
  name_prefix = "${var.app_name}-"

  ingress {
    from_port   = 22
    to_port     = 22
    protocol    = "tcp"
    cidr_blocks = ["0.0.0.0/0"]
  }

  egress {
    from_port   = 0
    to_port     = 0
    protocol    = "-1"
    cidr_blocks = ["0.0.0.0/0"]
  }
}

resource "aws_instance" "app" {
  ami                         = data.aws_ami.linux.id
  instance_type               = var.instance_type
  key_name                    = var.key_name
  vpc_security_group_ids      = [aws_security_group.app.id]
  associate_public_ip_address = true
  user_data                   = var.user_data

  tags = {
    Name = var.app_name
  }
}

output "public_host" { value = aws_instance.app.public_ip }
output "security_group_id" { value = aws_security_group.app.id }
output "instance_id" { value = aws_instance.app.id }
"#;

const FUNCTION: &str = r#"variable "runtime" { type = string }
variable "memory_mb" { type = number }
variable "handler" { type = string }

resource "aws_iam_role" "function" {
  name_prefix = "${var.app_name}-"
  assume_role_policy = jsonencode({
    Version = "2012-10-17"
    Statement = [{
      Action    = "sts:AssumeRole"
      Effect    = "Allow"
      Principal = { Service = "lambda.amazonaws.com" }
    }]
  })
}

resource "aws_iam_role_policy_attachment" "function_logs" {
  role       = aws_iam_role.function.name
  policy_arn = "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
}

# Placeholder bundle; the deploy step uploads the real code.
data "archive_file" "placeholder" {
  type        = "zip"
  output_path = "${path.module}/placeholder.zip"
  source {
    content  = "placeholder"
    filename = "README"
  }
}

resource "aws_lambda_function" "app" {
  function_name    = var.app_name
  role             = aws_iam_role.function.arn
  runtime          = var.runtime
  handler          = var.handler
  memory_size      = var.memory_mb
  filename         = data.archive_file.placeholder.output_path
  source_code_hash = data.archive_file.placeholder.output_base64sha256

  lifecycle {
    ignore_changes = [filename, source_code_hash]
  }
}

resource "aws_lambda_function_url" "app" {
  function_name      = aws_lambda_function.app.function_name
  authorization_type = "NONE"
}

output "function_name" { value = aws_lambda_function.app.function_name }
output "function_url" { value = aws_lambda_function_url.app.function_url }
"#;

const DATABASE_VARS: &str = r#"variable "db_engine" { type = string }
variable "db_scheme" { type = string }
variable "db_port" { type = number }
variable "db_password" {
  type      = string
  sensitive = true
}
"#;

const DATABASE: &str = r#"resource "aws_db_instance" "db" {
  identifier_prefix   = "${var.app_name}-"
  engine              = var.db_engine
  instance_class      = "db.t3.micro"
  allocated_storage   = 20
  db_name             = "appdb"
  username            = "appuser"
  password            = var.db_password
  skip_final_snapshot = true
}
"#;

// Reachable only from the app's security group.
const DATABASE_FOR_HOST: &str = r#"resource "aws_security_group" "db" {
  name_prefix = "${var.app_name}-db-"

  ingress {
    from_port       = var.db_port
    to_port         = var.db_port
    protocol        = "tcp"
    security_groups = [aws_security_group.app.id]
  }
}

resource "aws_db_instance" "db" {
  identifier_prefix      = "${var.app_name}-"
  engine                 = var.db_engine
  instance_class         = "db.t3.micro"
  allocated_storage      = 20
  db_name                = "appdb"
  username               = "appuser"
  password               = var.db_password
  vpc_security_group_ids = [aws_security_group.db.id]
  skip_final_snapshot    = true
}
"#;

const DATABASE_OUTPUTS: &str = r#"output "database_endpoint" { value = aws_db_instance.db.address }
output "database_url" {
  value     = "${var.db_scheme}://appuser:${var.db_password}@${aws_db_instance.db.address}:${var.db_port}/appdb"
  sensitive = true
}
"#;

const CACHE: &str = r#"resource "aws_elasticache_cluster" "cache" {
  cluster_id      = substr(var.app_name, 0, 40)
  engine          = "redis"
  node_type       = "cache.t3.micro"
  num_cache_nodes = 1
}

output "cache_endpoint" { value = aws_elasticache_cluster.cache.cache_nodes[0].address }
"#;

const QUEUE: &str = r#"resource "aws_sqs_queue" "jobs" {
  name_prefix = "${var.app_name}-"
}

output "queue_url" { value = aws_sqs_queue.jobs.url }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ShapeParams;

    fn decision(shape: Shape, size: SizeTier, database: Option<&str>) -> InfrastructureDecision {
        InfrastructureDecision {
            shape,
            params: ShapeParams {
                region: "us-east-1".to_string(),
                runtime: Runtime::Python311,
                size,
                ports: vec![5000],
                database: database.map(str::to_string),
                cache: None,
                queue: None,
                needs_gpu: false,
            },
            rule: "test".to_string(),
            notes: vec![],
        }
    }

    fn ctx() -> TemplateContext {
        TemplateContext {
            job: JobId::new(),
            app: AppName::derive("demo"),
            key_name: None,
            handler: None,
        }
    }

    #[test]
    fn vm_with_postgres_renders_host_and_database() {
        let d = decision(
            Shape::VirtualMachine,
            SizeTier::Instance {
                instance_type: "t3.small".to_string(),
            },
            Some("rds-postgres"),
        );
        let rendered = TerraformTemplates.render(&d, &ctx()).unwrap();
        assert_eq!(rendered.id, "aws-virtual-machine+postgres");
        assert!(rendered.main_tf.contains("resource \"aws_instance\" \"app\""));
        assert!(rendered.main_tf.contains("resource \"aws_security_group\" \"db\""));
        assert_eq!(rendered.variables["instance_type"], "t3.small");
        assert_eq!(rendered.variables["db_port"], 5432);
    }

    #[test]
    fn serverless_renders_function_url() {
        let d = decision(Shape::Serverless, SizeTier::Function { memory_mb: 512 }, None);
        let rendered = TerraformTemplates.render(&d, &ctx()).unwrap();
        assert_eq!(rendered.id, "aws-serverless");
        assert!(rendered.main_tf.contains("aws_lambda_function_url"));
        assert_eq!(rendered.variables["handler"], "app.handler");
        assert!(!rendered.main_tf.contains("aws_instance"));
    }

    #[test]
    fn mismatched_size_is_rejected() {
        let d = decision(Shape::Serverless, SizeTier::Instance { instance_type: "t3.small".into() }, None);
        assert!(matches!(
            TerraformTemplates.render(&d, &ctx()),
            Err(ProvisionError::Template { .. })
        ));
    }

    #[test]
    fn writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let d = decision(Shape::Container, SizeTier::Instance { instance_type: "t3.small".into() }, None);
        TerraformTemplates.render(&d, &ctx()).unwrap().write_to(dir.path()).unwrap();

        assert!(dir.path().join(MAIN_FILE).exists());
        let vars: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(VARS_FILE)).unwrap()).unwrap();
        assert!(vars["user_data"].as_str().unwrap().contains("docker"));
    }
}
