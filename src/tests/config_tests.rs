//! tests/config_tests.rs
//! Pruebas de validación de credenciales de tenant y del parseo de
//! timestamps .NET que entrega Stranzit.

#[cfg(test)]
mod tests {
    use crate::config::app_config::TenantConfig;
    use crate::models::call_record::parse_dotnet_timestamp;

    fn tenant() -> TenantConfig {
        TenantConfig {
            city_id: 1,
            name: "Пермь".to_string(),
            login: "perm_user".to_string(),
            password: "secreto".to_string(),
            domain: "perm.cloudpbx.rt.ru".to_string(),
        }
    }

    #[test]
    fn tenant_completo_es_valido() {
        assert!(tenant().is_valid());
    }

    #[test]
    fn password_placeholder_invalida_al_tenant() {
        let mut t = tenant();
        t.password = "ЗАПОЛНИТЕ_ПАРОЛЬ".to_string();
        assert!(!t.is_valid());
    }

    #[test]
    fn campos_vacios_invalidan_al_tenant() {
        for field in ["name", "login", "password", "domain"] {
            let mut t = tenant();
            match field {
                "name" => t.name.clear(),
                "login" => t.login.clear(),
                "password" => t.password.clear(),
                _ => t.domain.clear(),
            }
            assert!(!t.is_valid(), "debería ser inválido sin {}", field);
        }
    }

    #[test]
    fn timestamp_dotnet_valido() {
        // la hora exacta depende de la TZ local, el formato no
        let parsed = parse_dotnet_timestamp("/Date(1758446374000)/").unwrap();
        assert_eq!(parsed.len(), "2025-09-21 12:19:34".len());
        assert!(parsed.starts_with("2025-09-2"));
    }

    #[test]
    fn timestamp_dotnet_malformado() {
        assert!(parse_dotnet_timestamp("/Date(abc)/").is_none());
        assert!(parse_dotnet_timestamp("2025-01-15 14:30:45").is_none());
        assert!(parse_dotnet_timestamp("/Date(123").is_none());
        assert!(parse_dotnet_timestamp("").is_none());
    }
}
