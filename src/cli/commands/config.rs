//! Config command - Show the resolved configuration
//!
//! Prints where options were read from and the values that will be used,
//! with the ingestion key redacted.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use logdna_callback::callback::config::{AddressSetting, IgnoreList};
use logdna_callback::callback::transport::HttpIngest;

/// Arguments for the config command
#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// Print the configuration as JSON
    #[arg(long)]
    pub json: bool,
}

impl ConfigArgs {
    /// Execute the config command
    pub async fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let native = ctx.load_native()?;
        let config = ctx.resolve(&native);

        let endpoint = HttpIngest::endpoint_url(&config)
            .map(|url| url.to_string())
            .unwrap_or_else(|e| format!("<invalid: {}>", e));
        let source = native
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<none>".to_string());

        if self.json {
            let value = serde_json::json!({
                "source": source,
                "enabled": config.is_enabled(),
                "endpoint": endpoint,
                "app": config.app_name,
                "hostname": config.hostname_override,
                "ip_address": address(&config.ip_address),
                "mac_address": address(&config.mac_address),
                "tags": config.tags,
                "log_format": config.log_format(),
                "ignore_status": list(&config.ignore_status),
                "ignore_action": list(&config.ignore_action),
                "ignore_role": list(&config.ignore_role),
                "ignore_play": list(&config.ignore_play),
                "disable_loglevels": config.disable_loglevels,
                "use_target_host_for_hostname": config.use_target_host_for_hostname,
                "timeout_secs": config.timeout.as_secs_f64(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(0);
        }

        println!("Source:            {}", source);
        println!(
            "Forwarding:        {}",
            if config.is_enabled() {
                "enabled"
            } else {
                "disabled (no ingestion key)"
            }
        );
        println!("Endpoint:          {}", endpoint);
        println!("App:               {}", config.app_name);
        println!(
            "Hostname:          {}",
            if config.use_target_host_for_hostname {
                "<target host>".to_string()
            } else {
                config
                    .hostname_override
                    .clone()
                    .unwrap_or_else(|| "<detected>".to_string())
            }
        );
        println!("IP address:        {}", address(&config.ip_address));
        println!("MAC address:       {}", address(&config.mac_address));
        println!("Tags:              {}", config.tags.join(","));
        println!("Log format:        {}", config.log_format());
        println!("Ignore status:     {}", list(&config.ignore_status).join(","));
        println!("Ignore action:     {}", list(&config.ignore_action).join(","));
        println!("Ignore role:       {}", list(&config.ignore_role).join(","));
        println!("Ignore play:       {}", list(&config.ignore_play).join(","));
        println!("Log levels:        {}", !config.disable_loglevels);
        println!("Timeout:           {:?}", config.timeout);

        if ctx.verbosity >= 2 {
            println!("\n{:#?}", config);
        }

        Ok(0)
    }
}

fn address(setting: &AddressSetting) -> String {
    match setting {
        AddressSetting::Auto => "<detected>".to_string(),
        AddressSetting::Disabled => "<disabled>".to_string(),
        AddressSetting::Fixed(value) => value.clone(),
    }
}

fn list(names: &IgnoreList) -> Vec<&str> {
    names.iter().collect()
}
