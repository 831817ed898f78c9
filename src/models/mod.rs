pub mod dokploy;
